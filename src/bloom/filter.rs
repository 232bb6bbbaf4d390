use super::element::canonical_form;
use super::{FilterConfig, FilterError, FilterParams, FilterResult, FilterState};
use bitvec::{bitvec, order::Lsb0, vec::BitVec};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Point-in-time statistics of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub false_positive_rate: f64,
    pub size: usize,
    pub hash_count: usize,
    pub set_bits: usize,
    pub fill_ratio: f64,
    pub insert_count: usize,
}

/// Bounded memo of canonical element -> bit positions. Oldest entry goes
/// first once full.
struct PositionCache {
    capacity: usize,
    entries: FnvHashMap<String, Vec<usize>>,
    order: VecDeque<String>,
}

impl PositionCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: FnvHashMap::default(),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&self, key: &str) -> Option<Vec<usize>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: String, positions: Vec<usize>) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, positions);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct BloomFilter {
    config: FilterConfig,
    params: FilterParams,
    bits: BitVec<usize, Lsb0>,
    insert_count: usize,
    positions: Mutex<PositionCache>,
}

impl BloomFilter {
    pub fn new(config: FilterConfig) -> FilterResult<Self> {
        config.validate()?;

        let params = FilterParams::from(&config);
        let bits = bitvec![0; params.size];
        let positions = Mutex::new(PositionCache::new(config.position_cache_capacity));

        Ok(Self {
            config,
            params,
            bits,
            insert_count: 0,
            positions,
        })
    }

    /// Builds a filter straight from a snapshot. `config` contributes the
    /// hash strategy and memo size; dimensions come from the state.
    pub fn from_state(config: FilterConfig, state: FilterState) -> FilterResult<Self> {
        let mut filter = Self::new(config)?;
        filter.import_state(state)?;
        Ok(filter)
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    pub fn size(&self) -> usize {
        self.params.size
    }

    pub fn hash_count(&self) -> usize {
        self.params.hash_count
    }

    /// Successful (state-changing) `add` calls since creation or last import.
    pub fn insert_count(&self) -> usize {
        self.insert_count
    }

    pub fn memory_usage_bytes(&self) -> usize {
        self.params.size.div_ceil(8)
    }

    fn positions_for(&self, key: String) -> Vec<usize> {
        let mut memo = self.positions.lock();
        if let Some(hit) = memo.get(&key) {
            return hit;
        }
        let computed = self.config.hash_strategy.positions(
            key.as_bytes(),
            self.params.hash_count,
            self.params.size,
        );
        memo.put(key, computed.clone());
        computed
    }

    fn all_set(&self, positions: &[usize]) -> bool {
        positions.iter().all(|&idx| self.bits[idx])
    }

    /// Adds an element. Returns `false` without touching the bit array when
    /// the element already tests as (possibly) present.
    pub fn add<T: Serialize + ?Sized>(&mut self, element: &T) -> FilterResult<bool> {
        let key = canonical_form(element)?;
        let positions = self.positions_for(key);
        if self.all_set(&positions) {
            return Ok(false);
        }
        for idx in positions {
            self.bits.set(idx, true);
        }
        self.insert_count += 1;
        Ok(true)
    }

    /// Sequential `add`; returns how many elements changed the filter.
    pub fn add_all<'a, T, I>(&mut self, elements: I) -> FilterResult<usize>
    where
        T: Serialize + ?Sized + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut added = 0;
        for element in elements {
            if self.add(element)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// `false` means definitely absent; `true` means possibly present.
    pub fn has<T: Serialize + ?Sized>(&self, element: &T) -> FilterResult<bool> {
        let key = canonical_form(element)?;
        let positions = self.positions_for(key);
        Ok(self.all_set(&positions))
    }

    pub fn set_bits(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn fill_ratio(&self) -> f64 {
        self.set_bits() as f64 / self.params.size as f64
    }

    /// `(1 - e^(-k * fill))^k` using the live fill ratio.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let k = self.params.hash_count as f64;
        (1.0 - (-k * self.fill_ratio()).exp()).powf(k)
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            false_positive_rate: self.estimated_false_positive_rate(),
            size: self.params.size,
            hash_count: self.params.hash_count,
            set_bits: self.set_bits(),
            fill_ratio: self.fill_ratio(),
            insert_count: self.insert_count,
        }
    }

    pub fn clear(&mut self) {
        self.bits.fill(false);
        self.insert_count = 0;
        self.positions.lock().clear();
    }

    pub fn export_state(&self) -> FilterState {
        FilterState {
            size: self.params.size,
            hash_count: self.params.hash_count,
            bits: self.bits.iter().map(|b| u8::from(*b)).collect(),
            expected_elements: Some(self.config.expected_elements),
        }
    }

    pub fn import_state(&mut self, state: FilterState) -> FilterResult<()> {
        state.validate()?;

        let mut bits: BitVec<usize, Lsb0> = BitVec::with_capacity(state.size);
        bits.extend(state.bits.iter().map(|&b| b == 1));

        self.params = FilterParams {
            size: state.size,
            hash_count: state.hash_count,
        };
        if let Some(n) = state.expected_elements {
            self.config.expected_elements = n;
        }
        self.bits = bits;
        self.insert_count = 0;
        self.positions.lock().clear();
        Ok(())
    }

    #[cfg(test)]
    fn memo_len(&self) -> usize {
        self.positions.lock().len()
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BloomFilter {{ size: {}, hash_count: {}, expected_elements: {}, \
             target_fpr: {}, strategy: {:?} }}",
            self.params.size,
            self.params.hash_count,
            self.config.expected_elements,
            self.config.false_positive_rate,
            self.config.hash_strategy,
        )
    }
}

impl TryFrom<FilterState> for BloomFilter {
    type Error = FilterError;

    fn try_from(state: FilterState) -> FilterResult<Self> {
        let config = FilterConfig {
            expected_elements: state.expected_elements.unwrap_or(1),
            false_positive_rate: 0.01,
            size: None,
            hash_count: None,
            hash_strategy: Default::default(),
            position_cache_capacity: 1000,
        };
        Self::from_state(config, state)
    }
}

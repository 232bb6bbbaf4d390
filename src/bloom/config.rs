use super::{FilterError, FilterResult};
use crate::hash::{HashStrategy, optimal_hash_count, optimal_size};
use derive_builder::Builder;

#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct FilterConfig {
    /// Number of elements the filter is sized for
    #[builder(default = "1_000_000")]
    pub expected_elements: usize,

    /// Target false positive rate (0.0 to 1.0)
    #[builder(default = "0.01")]
    pub false_positive_rate: f64,

    /// Explicit bit count, overrides the derived optimum
    #[builder(default = "None", setter(strip_option))]
    pub size: Option<usize>,

    /// Explicit number of hash functions, overrides the derived optimum
    #[builder(default = "None", setter(strip_option))]
    pub hash_count: Option<usize>,

    #[builder(default)]
    pub hash_strategy: HashStrategy,

    /// Entries kept in the position memo
    #[builder(default = "1000")]
    pub position_cache_capacity: usize,
}

impl FilterConfig {
    pub fn validate(&self) -> FilterResult<()> {
        if self.expected_elements == 0 {
            return Err(FilterError::InvalidConfig(
                "Expected elements must be > 0".into(),
            ));
        }
        if self.false_positive_rate <= 0.0 || self.false_positive_rate >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "FPR must be between 0 and 1".into(),
            ));
        }
        if self.size == Some(0) {
            return Err(FilterError::InvalidConfig("Size must be > 0".into()));
        }
        if self.hash_count == Some(0) {
            return Err(FilterError::InvalidConfig(
                "Hash count must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Derived parameters calculated from FilterConfig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub size: usize,
    pub hash_count: usize,
}

impl From<&FilterConfig> for FilterParams {
    fn from(config: &FilterConfig) -> Self {
        let size = config.size.unwrap_or_else(|| {
            optimal_size(config.expected_elements, config.false_positive_rate)
        });
        let hash_count = config
            .hash_count
            .unwrap_or_else(|| optimal_hash_count(size, config.expected_elements));

        Self { size, hash_count }
    }
}

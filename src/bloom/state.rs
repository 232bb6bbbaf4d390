use super::{FilterError, FilterResult};
use serde::{Deserialize, Serialize};

/// Serializable snapshot of a [`BloomFilter`](super::BloomFilter).
///
/// Snapshots are plain owned data: exporting copies the live bit array and
/// importing copies it back, so a snapshot held elsewhere never aliases the
/// filter it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub size: usize,
    pub hash_count: usize,
    pub bits: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_elements: Option<usize>,
}

impl FilterState {
    pub fn validate(&self) -> FilterResult<()> {
        if self.size == 0 {
            return Err(FilterError::InvalidState("size must be > 0".into()));
        }
        if self.hash_count == 0 {
            return Err(FilterError::InvalidState(
                "hashCount must be > 0".into(),
            ));
        }
        if self.bits.len() != self.size {
            return Err(FilterError::InvalidState(format!(
                "bits length {} does not match size {}",
                self.bits.len(),
                self.size
            )));
        }
        if let Some(pos) = self.bits.iter().position(|&b| b > 1) {
            return Err(FilterError::InvalidState(format!(
                "bit {pos} is {} (expected 0 or 1)",
                self.bits[pos]
            )));
        }
        if self.expected_elements == Some(0) {
            return Err(FilterError::InvalidState(
                "expectedElements must be > 0 when present".into(),
            ));
        }
        Ok(())
    }

    pub fn set_bits(&self) -> usize {
        self.bits.iter().filter(|&&b| b == 1).count()
    }

    pub fn to_bytes(&self) -> FilterResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates.
    pub fn from_bytes(bytes: &[u8]) -> FilterResult<Self> {
        let state: FilterState = serde_json::from_slice(bytes)
            .map_err(|e| FilterError::InvalidState(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }
}

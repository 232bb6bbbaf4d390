use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate pool counters, persisted across restarts and recycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    /// Cumulative operations per slot, index = slot position
    pub workloads: Vec<u64>,
    pub total_operations: u64,
    pub last_updated: DateTime<Utc>,
    pub active_unit_count: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self {
            workloads: Vec::new(),
            total_operations: 0,
            last_updated: Utc::now(),
            active_unit_count: 0,
            metadata: BTreeMap::new(),
        }
    }
}

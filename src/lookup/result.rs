use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tier that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupSource {
    Filter,
    Cache,
    Store,
    /// Nothing was consulted, the key was empty
    None,
}

impl fmt::Display for LookupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookupSource::Filter => "filter",
            LookupSource::Cache => "cache",
            LookupSource::Store => "store",
            LookupSource::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult<E> {
    pub exists: bool,
    /// Never filled from the filter tier
    pub entity: Option<E>,
    pub source: LookupSource,
    pub query_time_ms: f64,
}

impl<E> LookupResult<E> {
    pub(crate) fn new(
        exists: bool,
        entity: Option<E>,
        source: LookupSource,
        elapsed: Duration,
    ) -> Self {
        Self {
            exists,
            entity,
            source,
            query_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupOptions {
    pub skip_filter: bool,
    pub skip_cache: bool,
    /// Go to the store even when the filter says absent or the cache hits
    pub force_store_check: bool,
    /// Repopulate faster tiers after a store hit
    pub update_caches_if_found: bool,
    /// Overrides the configured per-tier timeout
    pub timeout: Option<Duration>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            skip_filter: false,
            skip_cache: false,
            force_store_check: false,
            update_caches_if_found: true,
            timeout: None,
        }
    }
}

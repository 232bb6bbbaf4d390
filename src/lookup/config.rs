use derive_builder::Builder;
use std::time::Duration;

#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct LookupConfig {
    /// Prefix of cache keys, `"{namespace}:{key}"`
    #[builder(default = "\"entity\".to_string()", setter(into))]
    pub namespace: String,

    #[builder(default = "3600")]
    pub cache_ttl_secs: u64,

    /// Upper bound on a single tier call
    #[builder(default = "Duration::from_secs(2)")]
    pub tier_timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            namespace: "entity".to_string(),
            cache_ttl_secs: 3600,
            tier_timeout: Duration::from_secs(2),
        }
    }
}

impl LookupConfig {
    pub fn cache_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

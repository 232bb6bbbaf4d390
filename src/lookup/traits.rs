use super::error::{TierError, TierResult};
use crate::bloom::BloomFilter;
use crate::pool::FilterPool;
use async_trait::async_trait;
use std::time::Duration;

/// Probabilistic tier. `false` from `might_contain` is a guarantee.
#[async_trait]
pub trait MembershipFilter: Send + Sync {
    async fn might_contain(&self, key: &str) -> TierResult<bool>;

    async fn insert(&self, key: &str) -> TierResult<()>;
}

/// Volatile key-value tier with per-entry TTL.
#[async_trait]
pub trait VolatileCache: Send + Sync {
    async fn get(&self, key: &str) -> TierResult<Option<String>>;

    /// `ttl_secs == 0` keeps the entry until deleted.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> TierResult<()>;

    async fn del(&self, key: &str) -> TierResult<bool>;

    async fn exists(&self, key: &str) -> TierResult<bool>;

    /// Remaining lifetime; `None` for a missing key or one without expiry.
    async fn ttl(&self, key: &str) -> TierResult<Option<Duration>>;
}

/// Definitive tier.
#[async_trait]
pub trait EntityStore<E: Send + Sync + 'static>: Send + Sync {
    async fn find_by_identifier(&self, id: &str) -> TierResult<Option<E>>;

    async fn exists_by_identifier(&self, id: &str) -> TierResult<bool> {
        Ok(self.find_by_identifier(id).await?.is_some())
    }

    async fn insert(&self, id: &str, entity: &E) -> TierResult<()>;
}

#[async_trait]
impl MembershipFilter for FilterPool {
    async fn might_contain(&self, key: &str) -> TierResult<bool> {
        self.check_exists(key)
            .await
            .map_err(|e| TierError::new(e.to_string()))
    }

    async fn insert(&self, key: &str) -> TierResult<()> {
        self.add(key)
            .await
            .map(|_| ())
            .map_err(|e| TierError::new(e.to_string()))
    }
}

/// In-process filter without worker offload.
#[async_trait]
impl MembershipFilter for tokio::sync::Mutex<BloomFilter> {
    async fn might_contain(&self, key: &str) -> TierResult<bool> {
        self.lock()
            .await
            .has(key)
            .map_err(|e| TierError::new(e.to_string()))
    }

    async fn insert(&self, key: &str) -> TierResult<()> {
        self.lock()
            .await
            .add(key)
            .map(|_| ())
            .map_err(|e| TierError::new(e.to_string()))
    }
}

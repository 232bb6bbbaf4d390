use super::config::LookupConfig;
use super::error::{LookupError, TierError, TierResult};
use super::result::{LookupOptions, LookupResult, LookupSource};
use super::traits::{EntityStore, MembershipFilter, VolatileCache};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

async fn within<T>(limit: Duration, call: impl Future<Output = TierResult<T>>) -> TierResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(TierError(format!("timed out after {limit:?}"))))
}

/// Existence and lookup surface over filter, volatile cache and durable
/// store, consulted in that order.
///
/// A negative from the filter ends the lookup. Filter and cache failures are
/// logged and skipped; only the store can fail a call. One instance per
/// entity type.
pub struct TieredLookup<E: Send + Sync + 'static> {
    filter: Arc<dyn MembershipFilter>,
    cache: Arc<dyn VolatileCache>,
    store: Arc<dyn EntityStore<E>>,
    config: LookupConfig,
}

impl<E: Send + Sync + 'static> Clone for TieredLookup<E> {
    fn clone(&self) -> Self {
        Self {
            filter: Arc::clone(&self.filter),
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<E: Send + Sync + 'static> std::fmt::Debug for TieredLookup<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredLookup")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E> TieredLookup<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        filter: Arc<dyn MembershipFilter>,
        cache: Arc<dyn VolatileCache>,
        store: Arc<dyn EntityStore<E>>,
        config: LookupConfig,
    ) -> Self {
        Self {
            filter,
            cache,
            store,
            config,
        }
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Whether `key` exists. Never returns the entity, but a store hit
    /// still warms the cache and the filter.
    pub async fn exists(
        &self,
        key: &str,
        options: LookupOptions,
    ) -> Result<LookupResult<E>, LookupError> {
        self.lookup(key, &options, false).await
    }

    /// Same traversal as [`exists`](Self::exists), returning the entity.
    pub async fn get(
        &self,
        key: &str,
        options: LookupOptions,
    ) -> Result<LookupResult<E>, LookupError> {
        self.lookup(key, &options, true).await
    }

    /// Inserts a new entity: existence check, then store, then cache and
    /// filter. Cache and filter failures are logged; the store write stands.
    /// An entity that can't be encoded as JSON is rejected before any write.
    pub async fn add(&self, key: &str, entity: &E) -> Result<(), LookupError> {
        if key.is_empty() {
            return Err(LookupError::InvalidKey("key must not be empty".into()));
        }

        let check = LookupOptions {
            update_caches_if_found: false,
            ..LookupOptions::default()
        };
        if self.exists(key, check).await?.exists {
            return Err(LookupError::AlreadyExists(key.to_string()));
        }
        let payload =
            serde_json::to_string(entity).map_err(|e| LookupError::Serialization(e.to_string()))?;

        let limit = self.config.tier_timeout;
        within(limit, self.store.insert(key, entity))
            .await
            .map_err(|e| LookupError::Internal(format!("store insert for {key} failed: {e}")))?;

        let cache_key = self.config.cache_key(key);
        let ttl = self.config.cache_ttl_secs;
        if let Err(e) = within(limit, self.cache.set(&cache_key, &payload, ttl)).await {
            warn!(key, error = %e, "Cache write after insert failed");
        }

        if let Err(e) = within(limit, self.filter.insert(key)).await {
            warn!(key, error = %e, "Filter insert after store write failed");
        }

        debug!(key, "Entity added");
        Ok(())
    }

    async fn lookup(
        &self,
        key: &str,
        options: &LookupOptions,
        want_entity: bool,
    ) -> Result<LookupResult<E>, LookupError> {
        let started = Instant::now();
        if key.is_empty() {
            return Ok(LookupResult::new(false, None, LookupSource::None, started.elapsed()));
        }
        let limit = options.timeout.unwrap_or(self.config.tier_timeout);

        if !options.skip_filter {
            match within(limit, self.filter.might_contain(key)).await {
                Ok(false) if !options.force_store_check => {
                    debug!(key, source = %LookupSource::Filter, "Definitely absent");
                    return Ok(LookupResult::new(
                        false,
                        None,
                        LookupSource::Filter,
                        started.elapsed(),
                    ));
                }
                Ok(_) => {}
                Err(e) => warn!(key, error = %e, "Filter tier unavailable, falling through"),
            }
        }

        if !options.skip_cache && !options.force_store_check {
            let cache_key = self.config.cache_key(key);
            if want_entity {
                match within(limit, self.cache.get(&cache_key)).await {
                    Ok(Some(raw)) => match serde_json::from_str::<E>(&raw) {
                        Ok(entity) => {
                            debug!(key, source = %LookupSource::Cache, "Cache hit");
                            return Ok(LookupResult::new(
                                true,
                                Some(entity),
                                LookupSource::Cache,
                                started.elapsed(),
                            ));
                        }
                        Err(e) => {
                            warn!(key, error = %e, "Undecodable cache entry, treating as miss")
                        }
                    },
                    Ok(None) => {}
                    Err(e) => warn!(key, error = %e, "Cache tier unavailable, falling through"),
                }
            } else {
                match within(limit, self.cache.exists(&cache_key)).await {
                    Ok(true) => {
                        debug!(key, source = %LookupSource::Cache, "Cache hit");
                        return Ok(LookupResult::new(
                            true,
                            None,
                            LookupSource::Cache,
                            started.elapsed(),
                        ));
                    }
                    Ok(false) => {}
                    Err(e) => warn!(key, error = %e, "Cache tier unavailable, falling through"),
                }
            }
        }

        let found = within(limit, self.store.find_by_identifier(key))
            .await
            .map_err(|e| LookupError::Internal(format!("store lookup for {key} failed: {e}")))?;

        let result = match found {
            Some(entity) => {
                if options.update_caches_if_found {
                    self.repopulate(key, &entity);
                }
                let entity = want_entity.then_some(entity);
                LookupResult::new(true, entity, LookupSource::Store, started.elapsed())
            }
            None => LookupResult::new(false, None, LookupSource::Store, started.elapsed()),
        };
        debug!(key, source = %LookupSource::Store, exists = result.exists, "Store answered");
        Ok(result)
    }

    /// Fire-and-forget write-back of a store hit into cache and filter.
    fn repopulate(&self, key: &str, entity: &E) {
        let payload = match serde_json::to_string(entity) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(key, error = %e, "Entity not cacheable, only the filter is updated");
                None
            }
        };

        let filter = Arc::clone(&self.filter);
        let cache = Arc::clone(&self.cache);
        let cache_key = self.config.cache_key(key);
        let ttl = self.config.cache_ttl_secs;
        let limit = self.config.tier_timeout;
        let key = key.to_string();

        tokio::spawn(async move {
            if let Some(payload) = payload
                && let Err(e) = within(limit, cache.set(&cache_key, &payload, ttl)).await
            {
                warn!(key, error = %e, "Cache repopulation failed");
            }
            if let Err(e) = within(limit, filter.insert(&key)).await {
                warn!(key, error = %e, "Filter repopulation failed");
            }
        });
    }
}

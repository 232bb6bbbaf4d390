//! In-process cache and store, for tests and single-node setups.

use super::error::{TierError, TierResult};
use super::traits::{EntityStore, VolatileCache};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// TTL-expiring string cache. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry, returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    fn live<T>(&self, key: &str, read: impl FnOnce(&Entry) -> T) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key).map(|entry| entry.is_live(now)) {
            Some(true) => entries.get(key).map(read),
            Some(false) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl VolatileCache for MemoryCache {
    async fn get(&self, key: &str) -> TierResult<Option<String>> {
        Ok(self.live(key, |e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> TierResult<()> {
        let expires_at = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs));
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> TierResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> TierResult<bool> {
        Ok(self.live(key, |_| ()).is_some())
    }

    async fn ttl(&self, key: &str) -> TierResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .live(key, |e| e.expires_at)
            .flatten()
            .map(|at| at.saturating_duration_since(now)))
    }
}

/// Map-backed entity store. Inserting an existing id is an error.
pub struct MemoryStore<E> {
    entities: RwLock<HashMap<String, E>>,
}

impl<E> Default for MemoryStore<E> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }
}

impl<E> MemoryStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

#[async_trait]
impl<E> EntityStore<E> for MemoryStore<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn find_by_identifier(&self, id: &str) -> TierResult<Option<E>> {
        Ok(self.entities.read().get(id).cloned())
    }

    async fn exists_by_identifier(&self, id: &str) -> TierResult<bool> {
        Ok(self.entities.read().contains_key(id))
    }

    async fn insert(&self, id: &str, entity: &E) -> TierResult<()> {
        let mut entities = self.entities.write();
        if entities.contains_key(id) {
            return Err(TierError(format!("duplicate identifier {id}")));
        }
        entities.insert(id.to_string(), entity.clone());
        Ok(())
    }
}

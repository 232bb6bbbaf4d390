//! Bloom filter replicas running as pool units.

use super::config::PoolConfig;
use super::error::{PoolError, PoolResult};
use super::message::{UnitFactory, UnitId, UnitRequest, UnitService};
use super::worker_pool::WorkerPool;
use crate::bloom::{BloomFilter, FilterConfig, FilterState, FilterStats};
use crate::state::{StateError, StateStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct InitOptions {
    pub expected_elements: usize,
    pub false_positive_rate: f64,
    /// Start from the snapshot at `state_path` when one exists
    pub load_existing: bool,
    pub password: Option<String>,
    pub state_path: Option<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            expected_elements: 1_000_000,
            false_positive_rate: 0.01,
            load_existing: true,
            password: None,
            state_path: None,
        }
    }
}

impl std::fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOptions")
            .field("expected_elements", &self.expected_elements)
            .field("false_positive_rate", &self.false_positive_rate)
            .field("load_existing", &self.load_existing)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("state_path", &self.state_path)
            .finish()
    }
}

impl InitOptions {
    fn persistence(&self) -> Option<(&str, &str)> {
        match (&self.state_path, &self.password) {
            (Some(path), Some(password)) => Some((path.as_str(), password.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FilterRequest {
    Initialize(InitOptions),
    CheckExists { key: Value },
    Add { key: Value },
    AddAll { keys: Vec<Value> },
    Save,
    GetStats,
    RestoreState(FilterState),
}

impl UnitRequest for FilterRequest {
    fn action(&self) -> &'static str {
        match self {
            FilterRequest::Initialize(_) => "initialize",
            FilterRequest::CheckExists { .. } => "checkExists",
            FilterRequest::Add { .. } => "add",
            FilterRequest::AddAll { .. } => "addAll",
            FilterRequest::Save => "save",
            FilterRequest::GetStats => "getStats",
            FilterRequest::RestoreState(_) => "restoreState",
        }
    }

    fn replicate(&self) -> bool {
        matches!(
            self,
            FilterRequest::Initialize(_)
                | FilterRequest::Add { .. }
                | FilterRequest::AddAll { .. }
                | FilterRequest::RestoreState(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterReply {
    Initialized,
    Exists { exists: bool },
    Added { added: bool },
    AddedAll { added_count: usize },
    Saved { success: bool },
    Stats(FilterStats),
    Restored,
}

/// Starting point handed to a new or replacement unit.
#[derive(Debug, Clone)]
pub enum FilterSeed {
    /// The durable snapshot was refreshed just before; load it.
    Durable,
    /// Copy of a sibling's filter, used when nothing is persisted.
    State(FilterState),
}

pub struct FilterService {
    unit_id: UnitId,
    template: FilterConfig,
    store: StateStore,
    options: Option<InitOptions>,
    filter: Option<BloomFilter>,
}

impl FilterService {
    pub fn new(unit_id: UnitId, template: FilterConfig, store: StateStore) -> Self {
        Self {
            unit_id,
            template,
            store,
            options: None,
            filter: None,
        }
    }

    pub fn filter(&self) -> Option<&BloomFilter> {
        self.filter.as_ref()
    }

    fn config_for(&self, options: &InitOptions) -> FilterConfig {
        FilterConfig {
            expected_elements: options.expected_elements,
            false_positive_rate: options.false_positive_rate,
            ..self.template.clone()
        }
    }

    /// Builds the filter. A snapshot that exists but cannot be read is an
    /// error: starting empty would turn every stored key into a false
    /// negative.
    fn initialize(&mut self, options: InitOptions) -> Result<(), String> {
        let config = self.config_for(&options);
        config.validate().map_err(|e| e.to_string())?;

        let filter = match options.persistence() {
            Some((path, password)) if options.load_existing => {
                match self.store.load(path, password) {
                    Ok(state) => {
                        info!(unit_id = self.unit_id, path, "Filter restored from snapshot");
                        BloomFilter::from_state(config, state).map_err(|e| e.to_string())?
                    }
                    Err(StateError::NotFound(_)) => {
                        debug!(unit_id = self.unit_id, path, "No snapshot yet, starting empty");
                        BloomFilter::new(config).map_err(|e| e.to_string())?
                    }
                    Err(e) => return Err(format!("failed to load {path}: {e}")),
                }
            }
            _ => BloomFilter::new(config).map_err(|e| e.to_string())?,
        };

        self.filter = Some(filter);
        self.options = Some(options);
        Ok(())
    }

    fn restore(&mut self, state: FilterState) -> Result<(), String> {
        match self.filter.as_mut() {
            Some(filter) => filter.import_state(state).map_err(|e| e.to_string()),
            None => {
                let config = match &self.options {
                    Some(options) => self.config_for(options),
                    None => self.template.clone(),
                };
                self.filter =
                    Some(BloomFilter::from_state(config, state).map_err(|e| e.to_string())?);
                Ok(())
            }
        }
    }

    fn ready(&mut self) -> Result<&mut BloomFilter, String> {
        self.filter
            .as_mut()
            .ok_or_else(|| format!("filter on unit {} is not initialized", self.unit_id))
    }

    /// Writes the snapshot when persistence is configured. `Ok(false)` when
    /// it is not.
    fn persist(&self) -> Result<bool, String> {
        let (Some(filter), Some(options)) = (&self.filter, &self.options) else {
            return Ok(false);
        };
        let Some((path, password)) = options.persistence() else {
            return Ok(false);
        };
        self.store
            .save(&filter.export_state(), path, password)
            .map_err(|e| format!("failed to save {path}: {e}"))?;
        debug!(unit_id = self.unit_id, path, "Filter snapshot saved");
        Ok(true)
    }
}

impl UnitService for FilterService {
    type Request = FilterRequest;
    type Reply = FilterReply;
    type Snapshot = FilterSeed;

    fn handle(&mut self, request: FilterRequest) -> Result<FilterReply, String> {
        match request {
            FilterRequest::Initialize(options) => {
                self.initialize(options)?;
                Ok(FilterReply::Initialized)
            }
            FilterRequest::CheckExists { key } => {
                let exists = self.ready()?.has(&key).map_err(|e| e.to_string())?;
                Ok(FilterReply::Exists { exists })
            }
            FilterRequest::Add { key } => {
                let added = self.ready()?.add(&key).map_err(|e| e.to_string())?;
                Ok(FilterReply::Added { added })
            }
            FilterRequest::AddAll { keys } => {
                let added_count = self
                    .ready()?
                    .add_all(keys.iter())
                    .map_err(|e| e.to_string())?;
                Ok(FilterReply::AddedAll { added_count })
            }
            FilterRequest::Save => {
                self.ready()?;
                let success = self.persist()?;
                Ok(FilterReply::Saved { success })
            }
            FilterRequest::GetStats => Ok(FilterReply::Stats(self.ready()?.stats())),
            FilterRequest::RestoreState(state) => {
                self.restore(state)?;
                Ok(FilterReply::Restored)
            }
        }
    }

    fn snapshot(&self) -> Option<FilterSeed> {
        let filter = self.filter.as_ref()?;
        match self.persist() {
            Ok(true) => Some(FilterSeed::Durable),
            Ok(false) => Some(FilterSeed::State(filter.export_state())),
            Err(e) => {
                warn!(unit_id = self.unit_id, error = %e, "Falling back to in-memory hand-off");
                Some(FilterSeed::State(filter.export_state()))
            }
        }
    }

    fn flush(&mut self) -> Result<(), String> {
        self.persist().map(|_| ())
    }
}

/// Creates [`FilterService`] units. Holds the options of the last
/// `initialize` so units spawned later come up configured the same way.
pub struct FilterServiceFactory {
    template: FilterConfig,
    store: StateStore,
    options: parking_lot::RwLock<Option<InitOptions>>,
}

impl FilterServiceFactory {
    pub fn new(template: FilterConfig, store: StateStore) -> Self {
        Self {
            template,
            store,
            options: parking_lot::RwLock::new(None),
        }
    }

    pub fn with_options(self, options: InitOptions) -> Self {
        *self.options.write() = Some(options);
        self
    }

    pub fn set_options(&self, options: InitOptions) {
        *self.options.write() = Some(options);
    }

    pub fn options(&self) -> Option<InitOptions> {
        self.options.read().clone()
    }
}

impl UnitFactory<FilterService> for FilterServiceFactory {
    fn create(&self, unit_id: UnitId, seed: Option<FilterSeed>) -> Result<FilterService, String> {
        let mut service = FilterService::new(unit_id, self.template.clone(), self.store.clone());
        let options = self.options();

        match (seed, options) {
            (Some(FilterSeed::State(state)), options) => {
                service.options = options;
                service.restore(state)?;
            }
            (Some(FilterSeed::Durable), Some(options)) => {
                service.initialize(InitOptions {
                    load_existing: true,
                    ..options
                })?;
            }
            (Some(FilterSeed::Durable), None) => {
                return Err("durable seed without persistence options".to_string());
            }
            (None, Some(options)) => service.initialize(options)?,
            (None, None) => {}
        }
        Ok(service)
    }
}

/// [`WorkerPool`] of filter replicas with typed helpers.
#[derive(Clone)]
pub struct FilterPool {
    pool: WorkerPool<FilterService>,
    factory: Arc<FilterServiceFactory>,
}

impl std::fmt::Debug for FilterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPool")
            .field("pool", &self.pool)
            .field("options", &self.factory.options())
            .finish()
    }
}

fn to_key<T: Serialize + ?Sized>(key: &T) -> PoolResult<Value> {
    serde_json::to_value(key).map_err(|e| PoolError::Operation(format!("unsupported key: {e}")))
}

fn unexpected(reply: FilterReply) -> PoolError {
    PoolError::Operation(format!("unexpected reply: {reply:?}"))
}

impl FilterPool {
    pub fn start(
        config: PoolConfig,
        template: FilterConfig,
        store: StateStore,
    ) -> PoolResult<Self> {
        let factory = Arc::new(FilterServiceFactory::new(template, store.clone()));
        Self::with_factory(config, factory, store)
    }

    pub fn with_factory(
        config: PoolConfig,
        factory: Arc<FilterServiceFactory>,
        store: StateStore,
    ) -> PoolResult<Self> {
        let unit_factory: Arc<dyn UnitFactory<FilterService>> = factory.clone();
        let pool = WorkerPool::with_store(config, unit_factory, store)?;
        Ok(Self { pool, factory })
    }

    pub fn pool(&self) -> &WorkerPool<FilterService> {
        &self.pool
    }

    /// (Re)creates the filter on every unit.
    pub async fn initialize(&self, options: InitOptions) -> PoolResult<()> {
        self.factory.set_options(options.clone());
        match self
            .pool
            .assign_operation(FilterRequest::Initialize(options))
            .await?
            .reply
        {
            FilterReply::Initialized => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn check_exists<T: Serialize + ?Sized>(&self, key: &T) -> PoolResult<bool> {
        let key = to_key(key)?;
        match self
            .pool
            .assign_operation(FilterRequest::CheckExists { key })
            .await?
            .reply
        {
            FilterReply::Exists { exists } => Ok(exists),
            other => Err(unexpected(other)),
        }
    }

    pub async fn add<T: Serialize + ?Sized>(&self, key: &T) -> PoolResult<bool> {
        let key = to_key(key)?;
        match self.pool.assign_operation(FilterRequest::Add { key }).await?.reply {
            FilterReply::Added { added } => Ok(added),
            other => Err(unexpected(other)),
        }
    }

    pub async fn add_all<T: Serialize>(&self, keys: &[T]) -> PoolResult<usize> {
        let keys = keys.iter().map(to_key).collect::<PoolResult<Vec<_>>>()?;
        match self
            .pool
            .assign_operation(FilterRequest::AddAll { keys })
            .await?
            .reply
        {
            FilterReply::AddedAll { added_count } => Ok(added_count),
            other => Err(unexpected(other)),
        }
    }

    /// Persists the filter. `false` when no state path is configured.
    pub async fn save(&self) -> PoolResult<bool> {
        match self.pool.assign_operation(FilterRequest::Save).await?.reply {
            FilterReply::Saved { success } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub async fn stats(&self) -> PoolResult<FilterStats> {
        match self.pool.assign_operation(FilterRequest::GetStats).await?.reply {
            FilterReply::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    pub async fn restore(&self, state: FilterState) -> PoolResult<()> {
        match self
            .pool
            .assign_operation(FilterRequest::RestoreState(state))
            .await?
            .reply
        {
            FilterReply::Restored => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn terminate_all(&self) -> PoolResult<()> {
        self.pool.terminate_all().await
    }
}

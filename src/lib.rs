//! Bloom-filter fronted existence cache with encrypted state and worker offload.
//!
//! Lookups go through three tiers, cheapest first:
//!    * Filter: a standard Bloom filter. A negative answer is definitive and
//!      ends the lookup without touching anything else.
//!    * Volatile cache: key-value store with per-entry TTL, keyed
//!      `"{namespace}:{key}"`.
//!    * Durable store: the source of truth. A hit there repopulates the
//!      cache and the filter in the background.
//!
//! Filter operations run on a pool of dedicated units:
//!    * Every unit holds a full replica. Mutations are delivered to all of
//!      them, reads go to the least loaded one.
//!    * A unit is recycled after a fixed number of operations. Its
//!      replacement starts from the durable snapshot, or from an in-memory
//!      copy when nothing is persisted.
//!    * Aggregate counters are checkpointed periodically and on shutdown.
//!
//! Persisted state is JSON encrypted with AES-256-GCM under a PBKDF2-derived
//! key, stored base64 encoded in a file or a redb table.

pub mod bloom;
pub mod codec;
pub mod common;
pub mod config;
pub mod hash;
pub mod lookup;
pub mod pool;
pub mod state;

pub use bloom::{
    BloomFilter, FilterConfig, FilterConfigBuilder, FilterConfigBuilderError, FilterError,
    FilterResult, FilterState, FilterStats,
};
pub use codec::{Codec, CodecError, CodecResult};
pub use config::{ConfigError, ServiceConfig, ServiceConfigBuilder};
pub use hash::{HashStrategy, optimal_hash_count, optimal_size};
pub use lookup::{
    EntityStore, LookupConfig, LookupError, LookupOptions, LookupResult, LookupSource,
    MembershipFilter, MemoryCache, MemoryStore, TierError, TieredLookup, VolatileCache,
};
pub use pool::{
    FilterPool, InitOptions, PoolConfig, PoolConfigBuilder, PoolError, PoolResult, ThreadState,
    WorkerPool,
};
#[cfg(feature = "redb")]
pub use state::RedbBackend;
pub use state::{FileBackend, StateBackend, StateError, StateResult, StateStore};

//! Tiered existence checks and lookups: filter, then volatile cache, then
//! durable store
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod result;
pub mod traits;

pub use config::{LookupConfig, LookupConfigBuilder, LookupConfigBuilderError};
pub use error::{LookupError, TierError, TierResult};
pub use memory::{MemoryCache, MemoryStore};
pub use orchestrator::TieredLookup;
pub use result::{LookupOptions, LookupResult, LookupSource};
pub use traits::{EntityStore, MembershipFilter, VolatileCache};

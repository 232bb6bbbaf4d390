//! Encrypted persistence of filter snapshots and pool checkpoints
pub mod backend;
pub mod error;
pub mod store;

#[cfg(feature = "redb")]
pub use backend::RedbBackend;
pub use backend::{FileBackend, StateBackend};
pub use error::{StateError, StateResult};
pub use store::StateStore;

use super::message::{OperationId, UnitId};
use crate::state::StateError;
use std::time::Duration;
use thiserror::Error;

pub type PoolResult<T> = std::result::Result<T, PoolError>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("All {max_units} units are saturated")]
    CapacityExceeded { max_units: usize },

    #[error("Pool is shutting down")]
    ShuttingDown,

    #[error("Operation {operation_id} timed out after {timeout:?}")]
    Timeout {
        operation_id: OperationId,
        timeout: Duration,
    },

    #[error("Unit {unit_id} went away before replying")]
    UnitGone { unit_id: UnitId },

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Unit failed to start: {0}")]
    UnitStartup(String),

    #[error("No unit at index {index} (pool has {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

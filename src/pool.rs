//! Background worker pool: filter operations run on dedicated units with
//! capacity-bounded dispatch, recycling and counter checkpoints
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod filter_service;
pub mod message;
mod unit;
pub mod worker_pool;

pub use checkpoint::ThreadState;
pub use config::{PoolConfig, PoolConfigBuilder, PoolConfigBuilderError};
pub use error::{PoolError, PoolResult};
pub use filter_service::{
    FilterPool, FilterReply, FilterRequest, FilterSeed, FilterService, FilterServiceFactory,
    InitOptions,
};
pub use message::{
    Completed, OperationId, RequestEnvelope, ResponseEnvelope, UnitFactory, UnitId, UnitRequest,
    UnitService,
};
pub use unit::UnitState;
pub use worker_pool::{UnitInfo, WorkerPool};

//! Envelopes exchanged between the pool and its units, and the traits a
//! unit's workload implements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

pub type UnitId = usize;

/// Correlation id pairing a dispatched operation with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub trait UnitRequest: Clone + Send + fmt::Debug + 'static {
    /// Short action name used in envelopes and logs.
    fn action(&self) -> &'static str;

    /// Requests that change unit state must reach every live unit so the
    /// replicas never diverge.
    fn replicate(&self) -> bool {
        false
    }
}

/// Work executed inside a unit. A unit owns exactly one service and calls it
/// from a single thread, one request at a time.
pub trait UnitService: Send + 'static {
    type Request: UnitRequest;
    type Reply: Send + fmt::Debug + 'static;
    /// State handed to a replacement or newly added unit.
    type Snapshot: Send + 'static;

    fn handle(&mut self, request: Self::Request) -> Result<Self::Reply, String>;

    fn snapshot(&self) -> Option<Self::Snapshot> {
        None
    }

    /// Persist whatever must survive the unit. Called on graceful shutdown
    /// and on demand.
    fn flush(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Builds the service of a freshly spawned unit, on the unit's own thread.
pub trait UnitFactory<S: UnitService>: Send + Sync + 'static {
    fn create(&self, unit_id: UnitId, seed: Option<S::Snapshot>) -> Result<S, String>;
}

impl<S, F> UnitFactory<S> for F
where
    S: UnitService,
    F: Fn(UnitId, Option<S::Snapshot>) -> Result<S, String> + Send + Sync + 'static,
{
    fn create(&self, unit_id: UnitId, seed: Option<S::Snapshot>) -> Result<S, String> {
        self(unit_id, seed)
    }
}

#[derive(Debug, Clone)]
pub struct RequestEnvelope<R> {
    pub action: &'static str,
    pub payload: R,
    pub operation_id: OperationId,
    pub timestamp: DateTime<Utc>,
}

impl<R: UnitRequest> RequestEnvelope<R> {
    pub fn new(payload: R) -> Self {
        Self {
            action: payload.action(),
            payload,
            operation_id: OperationId::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct ResponseEnvelope<T> {
    pub result: Result<T, String>,
    pub unit_id: UnitId,
    pub operation_id: OperationId,
    pub timestamp: DateTime<Utc>,
}

/// What a unit's inbox carries.
pub(crate) enum Envelope<S: UnitService> {
    Operation(RequestEnvelope<S::Request>),
    Snapshot(oneshot::Sender<Option<S::Snapshot>>),
    Flush(oneshot::Sender<Result<(), String>>),
    /// Stop after the queued work. `flush` persists the state on the way out.
    Shutdown { flush: bool },
}

/// A reply together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed<T> {
    pub unit_id: UnitId,
    pub operation_id: OperationId,
    pub reply: T,
}

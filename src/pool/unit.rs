use super::error::{PoolError, PoolResult};
use super::message::{
    Envelope, RequestEnvelope, ResponseEnvelope, UnitFactory, UnitId, UnitService,
};
use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a single unit as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    Ready,
    RecycleEligible,
    Terminating,
    Gone,
}

/// Pool-side handle of a unit. The unit itself only ever sees its inbox.
pub(crate) struct UnitHandle<S: UnitService> {
    pub id: UnitId,
    pub state: UnitState,
    /// Operations dispatched to this unit since it was created
    pub assigned: u64,
    pub in_flight: Arc<AtomicUsize>,
    inbox: mpsc::UnboundedSender<Envelope<S>>,
    thread: Option<JoinHandle<()>>,
}

impl<S: UnitService> UnitHandle<S> {
    /// Spawns the unit thread and waits until the factory has produced the
    /// service (Created -> Ready).
    pub async fn spawn(
        id: UnitId,
        factory: Arc<dyn UnitFactory<S>>,
        seed: Option<S::Snapshot>,
        responses: mpsc::UnboundedSender<ResponseEnvelope<S::Reply>>,
    ) -> PoolResult<Self> {
        let (inbox, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name(format!("tbloom-unit-{id}"))
            .spawn(move || run_unit(id, factory, seed, rx, responses, ready_tx))
            .map_err(|e| PoolError::UnitStartup(e.to_string()))?;

        let mut handle = Self {
            id,
            state: UnitState::Created,
            assigned: 0,
            in_flight: Arc::new(AtomicUsize::new(0)),
            inbox,
            thread: Some(thread),
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                handle.state = UnitState::Ready;
                info!(unit_id = id, "Unit ready");
                Ok(handle)
            }
            Ok(Err(msg)) => Err(PoolError::UnitStartup(msg)),
            Err(_) => Err(PoolError::UnitStartup(format!(
                "unit {id} exited before becoming ready"
            ))),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn send(&self, envelope: RequestEnvelope<S::Request>) -> bool {
        self.inbox.send(Envelope::Operation(envelope)).is_ok()
    }

    /// Asks the unit for a copy of its state. Queued behind in-flight work.
    pub async fn snapshot(&self, timeout: Duration) -> Result<Option<S::Snapshot>, String> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(Envelope::Snapshot(tx))
            .map_err(|_| format!("unit {} is not running", self.id))?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(format!("unit {} stopped before answering", self.id)),
            Err(_) => Err(format!("unit {} snapshot timed out after {timeout:?}", self.id)),
        }
    }

    pub async fn flush(&self, timeout: Duration) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(Envelope::Flush(tx))
            .map_err(|_| format!("unit {} is not running", self.id))?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(format!("unit {} stopped before flushing", self.id)),
            Err(_) => Err(format!("unit {} flush timed out after {timeout:?}", self.id)),
        }
    }

    /// Graceful stop: the unit exits after draining its inbox, flushing
    /// first when `flush` is set. Returns `false` if it did not finish within
    /// `grace`; the thread is then detached (OS threads cannot be killed) and
    /// exits on its own once the queued work is done.
    pub async fn terminate(mut self, grace: Duration, flush: bool) -> bool {
        self.state = UnitState::Terminating;
        let _ = self.inbox.send(Envelope::Shutdown { flush });

        let Some(thread) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(unit_id = self.id, ?grace, "Unit did not stop in time, detaching");
                self.state = UnitState::Gone;
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let clean = thread.join().is_ok();
        if !clean {
            warn!(unit_id = self.id, "Unit thread panicked during shutdown");
        }

        // Replies the unit sent before exiting may still be on their way
        // through the router
        while self.in_flight() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        self.state = UnitState::Gone;
        debug!(unit_id = self.id, "Unit terminated");
        clean
    }
}

fn run_unit<S: UnitService>(
    id: UnitId,
    factory: Arc<dyn UnitFactory<S>>,
    seed: Option<S::Snapshot>,
    mut inbox: mpsc::UnboundedReceiver<Envelope<S>>,
    responses: mpsc::UnboundedSender<ResponseEnvelope<S::Reply>>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut service = match factory.create(id, seed) {
        Ok(service) => {
            let _ = ready.send(Ok(()));
            service
        }
        Err(msg) => {
            let _ = ready.send(Err(msg));
            return;
        }
    };

    while let Some(envelope) = inbox.blocking_recv() {
        match envelope {
            Envelope::Operation(request) => {
                let RequestEnvelope {
                    action,
                    payload,
                    operation_id,
                    ..
                } = request;

                let result = panic::catch_unwind(AssertUnwindSafe(|| service.handle(payload)))
                    .unwrap_or_else(|_| Err(format!("unit {id} panicked while handling {action}")));

                let response = ResponseEnvelope {
                    result,
                    unit_id: id,
                    operation_id,
                    timestamp: Utc::now(),
                };
                if responses.send(response).is_err() {
                    // Pool is gone, nobody left to answer
                    break;
                }
            }
            // A caller that timed out has dropped its receiver. Its snapshot
            // or flush is skipped so a stale write never lands late.
            Envelope::Snapshot(reply) if reply.is_closed() => {
                debug!(unit_id = id, "Snapshot abandoned by caller, skipped");
            }
            Envelope::Snapshot(reply) => {
                let _ = reply.send(service.snapshot());
            }
            Envelope::Flush(reply) if reply.is_closed() => {
                debug!(unit_id = id, "Flush abandoned by caller, skipped");
            }
            Envelope::Flush(reply) => {
                let _ = reply.send(service.flush());
            }
            Envelope::Shutdown { flush } => {
                if flush && let Err(e) = service.flush() {
                    warn!(unit_id = id, error = %e, "Unit failed to flush on shutdown");
                }
                break;
            }
        }
    }

    debug!(unit_id = id, "Unit stopped");
}

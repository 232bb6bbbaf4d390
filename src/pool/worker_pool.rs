use super::checkpoint::ThreadState;
use super::config::PoolConfig;
use super::error::{PoolError, PoolResult};
use super::message::{
    Completed, OperationId, RequestEnvelope, ResponseEnvelope, UnitFactory, UnitId,
    UnitRequest, UnitService,
};
use super::unit::{UnitHandle, UnitState};
use crate::state::{StateError, StateStore};
use chrono::Utc;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Caller waiting on a correlation id. Fan-out copies have no waiter.
struct Pending<T> {
    waiter: Option<oneshot::Sender<ResponseEnvelope<T>>>,
    unit_id: UnitId,
    in_flight: Arc<AtomicUsize>,
}

type PendingMap<T> = Arc<DashMap<OperationId, Pending<T>>>;

struct Slot<S: UnitService> {
    unit: UnitHandle<S>,
    /// Cumulative operations for this slot, survives recycling
    workload: u64,
}

/// Read-only view of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub index: usize,
    pub unit_id: UnitId,
    pub state: UnitState,
    pub assigned: u64,
    pub in_flight: usize,
    pub workload: u64,
}

struct PoolInner<S: UnitService> {
    config: PoolConfig,
    factory: Arc<dyn UnitFactory<S>>,
    store: StateStore,
    slots: Mutex<Vec<Slot<S>>>,
    pending: PendingMap<S::Reply>,
    responses: mpsc::UnboundedSender<ResponseEnvelope<S::Reply>>,
    next_unit_id: AtomicUsize,
    total_operations: AtomicU64,
    /// Workloads restored from a checkpoint, by slot index
    carried_workloads: parking_lot::Mutex<Vec<u64>>,
    draining: AtomicBool,
    router: parking_lot::Mutex<Option<JoinHandle<()>>>,
    checkpoint: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Capacity-bounded pool of message-passing units.
///
/// Each unit runs on its own OS thread and owns one [`UnitService`]. Requests
/// that report [`UnitRequest::replicate`] are delivered to every live unit so
/// replicas stay identical. The caller's reply comes from an idle unit with
/// budget left; when all are busy the pool grows, and once full the request
/// waits in the least-loaded unit's inbox. When every unit has spent its
/// budget and the pool is full, [`PoolError::CapacityExceeded`] is returned.
///
/// Must be created inside a Tokio runtime.
pub struct WorkerPool<S: UnitService> {
    inner: Arc<PoolInner<S>>,
}

impl<S: UnitService> Clone for WorkerPool<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: UnitService> fmt::Debug for WorkerPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.pending.len())
            .field("draining", &self.inner.draining.load(Ordering::Relaxed))
            .finish()
    }
}

impl<S: UnitService> WorkerPool<S> {
    pub fn new(config: PoolConfig, factory: Arc<dyn UnitFactory<S>>) -> PoolResult<Self> {
        Self::with_store(config, factory, StateStore::file())
    }

    pub fn with_store(
        config: PoolConfig,
        factory: Arc<dyn UnitFactory<S>>,
        store: StateStore,
    ) -> PoolResult<Self> {
        config.validate()?;

        let (responses, response_rx) = mpsc::unbounded_channel();
        let pending: PendingMap<S::Reply> = Arc::new(DashMap::new());
        let router = tokio::spawn(route_responses(response_rx, Arc::clone(&pending)));

        let inner = Arc::new(PoolInner {
            config,
            factory,
            store,
            slots: Mutex::new(Vec::new()),
            pending,
            responses,
            next_unit_id: AtomicUsize::new(1),
            total_operations: AtomicU64::new(0),
            carried_workloads: parking_lot::Mutex::new(Vec::new()),
            draining: AtomicBool::new(false),
            router: parking_lot::Mutex::new(Some(router)),
            checkpoint: parking_lot::Mutex::new(None),
        });
        *inner.checkpoint.lock() = spawn_checkpoint(&inner);

        info!(config = ?inner.config, "Worker pool started");
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    /// Correlation ids still registered, including abandoned ones whose
    /// reply has not arrived yet.
    pub fn pending_operations(&self) -> usize {
        self.inner.pending.len()
    }

    pub async fn assign_operation(&self, request: S::Request) -> PoolResult<Completed<S::Reply>> {
        let timeout = self.inner.config.operation_timeout;
        self.assign_operation_with_timeout(request, timeout).await
    }

    pub async fn assign_operation_with_timeout(
        &self,
        request: S::Request,
        timeout: Duration,
    ) -> PoolResult<Completed<S::Reply>> {
        let inner = &self.inner;
        if inner.is_draining() {
            return Err(PoolError::ShuttingDown);
        }

        let (operation_id, unit_id, reply) = {
            let mut slots = inner.slots.lock().await;
            if inner.is_draining() {
                return Err(PoolError::ShuttingDown);
            }

            inner.recycle_spent(&mut slots).await?;

            // idle unit first, then grow, then queue behind the least loaded
            let picked = inner.pick_unit(&slots);
            let idle = picked.filter(|&index| slots[index].unit.in_flight() == 0);
            let index = match (idle, picked) {
                (Some(index), _) => index,
                (None, _) if slots.len() < inner.config.max_units => {
                    match (inner.add_unit(&mut slots).await, picked) {
                        (Ok(()), _) => slots.len() - 1,
                        (Err(e), Some(index)) => {
                            warn!(error = %e, "Could not grow the pool, queueing on a busy unit");
                            index
                        }
                        (Err(e), None) => return Err(e),
                    }
                }
                (None, Some(index)) => index,
                (None, None) => {
                    warn!(
                        max_units = inner.config.max_units,
                        action = request.action(),
                        "No unit has budget left"
                    );
                    return Err(PoolError::CapacityExceeded {
                        max_units: inner.config.max_units,
                    });
                }
            };

            inner.dispatch(&mut slots, index, request)?
        };

        inner.await_reply(operation_id, unit_id, reply, timeout).await
    }

    /// Stops the unit at `index`. Returns whether it stopped within the
    /// grace period; its bookkeeping is removed either way and callers still
    /// waiting on it get [`PoolError::UnitGone`].
    ///
    /// The unit flushes before the slot lock is released, so its write
    /// cannot land between a recycle's snapshot and the replacement's load.
    /// It does not flush again on exit.
    pub async fn terminate_unit(&self, index: usize) -> PoolResult<bool> {
        let slot = {
            let mut slots = self.inner.slots.lock().await;
            if index >= slots.len() {
                return Err(PoolError::InvalidIndex {
                    index,
                    len: slots.len(),
                });
            }
            {
                let mut carried = self.inner.carried_workloads.lock();
                if index < carried.len() {
                    carried.remove(index);
                }
            }
            let slot = slots.remove(index);
            if let Err(e) = slot.unit.flush(self.inner.config.operation_timeout).await {
                warn!(unit_id = slot.unit.id, error = %e, "Removed unit failed to flush");
            }
            slot
        };

        let unit_id = slot.unit.id;
        let graceful = slot
            .unit
            .terminate(self.inner.config.shutdown_grace, false)
            .await;
        self.inner.pending.retain(|_, p| p.unit_id != unit_id);
        info!(unit_id, index, graceful, "Unit terminated");
        Ok(graceful)
    }

    /// Drains the pool: new work is rejected with [`PoolError::ShuttingDown`],
    /// counters are checkpointed and every unit is stopped concurrently.
    /// Units are replicas, so only the first one that manages to flush
    /// writes the state. Calling it again is a no-op.
    pub async fn terminate_all(&self) -> PoolResult<()> {
        let inner = &self.inner;
        if inner.draining.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(task) = inner.checkpoint.lock().take() {
            task.abort();
        }

        if let Err(e) = inner.save_state().await {
            error!(error = %e, "Failed to persist pool state during shutdown");
        }

        let slots: Vec<Slot<S>> = inner.slots.lock().await.drain(..).collect();
        for slot in &slots {
            match slot.unit.flush(inner.config.operation_timeout).await {
                Ok(()) => break,
                Err(e) => warn!(unit_id = slot.unit.id, error = %e, "Unit failed to flush"),
            }
        }

        let grace = inner.config.shutdown_grace;
        let stops: Vec<_> = slots
            .into_iter()
            .map(|slot| {
                tokio::spawn(async move {
                    let unit_id = slot.unit.id;
                    (unit_id, slot.unit.terminate(grace, false).await)
                })
            })
            .collect();

        for stop in stops {
            match stop.await {
                Ok((unit_id, false)) => warn!(unit_id, "Unit detached during pool shutdown"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Unit shutdown task failed"),
            }
        }

        inner.pending.clear();
        if let Some(router) = inner.router.lock().take() {
            router.abort();
        }
        info!("Worker pool terminated");
        Ok(())
    }

    /// Asks every unit to persist its state.
    pub async fn flush_all(&self) -> PoolResult<()> {
        let slots = self.inner.slots.lock().await;
        for slot in slots.iter() {
            slot.unit
                .flush(self.inner.config.operation_timeout)
                .await
                .map_err(PoolError::Operation)?;
        }
        Ok(())
    }

    pub async fn save_state(&self) -> PoolResult<()> {
        self.inner.save_state().await
    }

    /// Restores counters from the checkpoint. Best effort: a missing or
    /// unreadable checkpoint is logged and counters stay as they are.
    pub async fn load_state(&self) -> bool {
        self.inner.load_state().await
    }

    pub async fn thread_state(&self) -> ThreadState {
        self.inner.thread_state().await
    }

    pub async fn units(&self) -> Vec<UnitInfo> {
        let slots = self.inner.slots.lock().await;
        slots
            .iter()
            .enumerate()
            .map(|(index, slot)| UnitInfo {
                index,
                unit_id: slot.unit.id,
                state: slot.unit.state,
                assigned: slot.unit.assigned,
                in_flight: slot.unit.in_flight(),
                workload: slot.workload,
            })
            .collect()
    }
}

impl<S: UnitService> PoolInner<S> {
    fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    fn next_unit_id(&self) -> UnitId {
        self.next_unit_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_spent(&self, slot: &Slot<S>) -> bool {
        slot.unit.assigned >= self.config.operations_per_unit
    }

    /// Least-loaded unit with budget left: fewest in flight, then fewest
    /// assigned.
    fn pick_unit(&self, slots: &[Slot<S>]) -> Option<usize> {
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.unit.state == UnitState::Ready && !self.is_spent(slot))
            .min_by_key(|(_, slot)| (slot.unit.in_flight(), slot.unit.assigned))
            .map(|(index, _)| index)
    }

    /// Replaces every spent unit that has nothing in flight. Spent units
    /// that are still busy are left for a later call.
    async fn recycle_spent(&self, slots: &mut [Slot<S>]) -> PoolResult<()> {
        for index in 0..slots.len() {
            if self.is_spent(&slots[index]) && slots[index].unit.in_flight() == 0 {
                self.recycle_slot(slots, index).await?;
            }
        }
        Ok(())
    }

    async fn recycle_slot(&self, slots: &mut [Slot<S>], index: usize) -> PoolResult<()> {
        let timeout = self.config.operation_timeout;
        let seed = slots[index]
            .unit
            .snapshot(timeout)
            .await
            .map_err(PoolError::UnitStartup)?;

        let unit_id = self.next_unit_id();
        let fresh =
            UnitHandle::spawn(unit_id, Arc::clone(&self.factory), seed, self.responses.clone())
                .await?;
        let mut old = std::mem::replace(&mut slots[index].unit, fresh);
        old.state = UnitState::RecycleEligible;

        info!(
            index,
            old_unit_id = old.id,
            unit_id,
            assigned = old.assigned,
            workload = slots[index].workload,
            "Recycling unit"
        );
        // The snapshot already carried the state over, the retired unit
        // must not write it again
        let old_id = old.id;
        if !old.terminate(self.config.shutdown_grace, false).await {
            warn!(unit_id = old_id, "Recycled unit did not stop in time");
        }
        Ok(())
    }

    /// Spawns a unit in a new slot. With live siblings, the newcomer is
    /// seeded from the least busy one so it starts with the same contents.
    async fn add_unit(&self, slots: &mut Vec<Slot<S>>) -> PoolResult<()> {
        let donor = slots
            .iter()
            .filter(|slot| slot.unit.state != UnitState::Terminating)
            .min_by_key(|slot| slot.unit.in_flight());

        let seed = match donor {
            Some(slot) => slot
                .unit
                .snapshot(self.config.operation_timeout)
                .await
                .map_err(|e| PoolError::UnitStartup(format!("could not seed new unit: {e}")))?,
            None => None,
        };

        let unit_id = self.next_unit_id();
        let unit =
            UnitHandle::spawn(unit_id, Arc::clone(&self.factory), seed, self.responses.clone())
                .await?;
        let workload = self
            .carried_workloads
            .lock()
            .get(slots.len())
            .copied()
            .unwrap_or(0);

        info!(unit_id, index = slots.len(), "Unit added to pool");
        slots.push(Slot { unit, workload });
        Ok(())
    }

    fn dispatch(
        &self,
        slots: &mut [Slot<S>],
        index: usize,
        request: S::Request,
    ) -> PoolResult<(OperationId, UnitId, oneshot::Receiver<ResponseEnvelope<S::Reply>>)> {
        if request.replicate() {
            for (other, slot) in slots.iter_mut().enumerate() {
                if other == index {
                    continue;
                }
                if let Err(e) = self.send_to(slot, request.clone(), None) {
                    warn!(error = %e, action = request.action(), "Failed to replicate operation");
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        let slot = &mut slots[index];
        let unit_id = slot.unit.id;
        let operation_id = self.send_to(slot, request, Some(tx))?;
        Ok((operation_id, unit_id, rx))
    }

    fn send_to(
        &self,
        slot: &mut Slot<S>,
        request: S::Request,
        waiter: Option<oneshot::Sender<ResponseEnvelope<S::Reply>>>,
    ) -> PoolResult<OperationId> {
        let envelope = RequestEnvelope::new(request);
        let operation_id = envelope.operation_id;
        let action = envelope.action;
        let unit = &mut slot.unit;

        unit.in_flight.fetch_add(1, Ordering::AcqRel);
        self.pending.insert(
            operation_id,
            Pending {
                waiter,
                unit_id: unit.id,
                in_flight: Arc::clone(&unit.in_flight),
            },
        );

        if !unit.send(envelope) {
            self.pending.remove(&operation_id);
            unit.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(PoolError::UnitGone { unit_id: unit.id });
        }

        unit.assigned += 1;
        slot.workload += 1;
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if unit.assigned >= self.config.operations_per_unit {
            unit.state = UnitState::RecycleEligible;
        }

        debug!(unit_id = unit.id, %operation_id, action, "Operation dispatched");
        Ok(operation_id)
    }

    async fn await_reply(
        &self,
        operation_id: OperationId,
        unit_id: UnitId,
        reply: oneshot::Receiver<ResponseEnvelope<S::Reply>>,
        timeout: Duration,
    ) -> PoolResult<Completed<S::Reply>> {
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(response)) => match response.result {
                Ok(reply) => Ok(Completed {
                    unit_id: response.unit_id,
                    operation_id,
                    reply,
                }),
                Err(msg) => Err(PoolError::Operation(msg)),
            },
            Ok(Err(_)) => Err(PoolError::UnitGone { unit_id }),
            Err(_) => {
                // The entry stays registered; the router drops the late reply
                warn!(unit_id, %operation_id, ?timeout, "Operation timed out");
                Err(PoolError::Timeout {
                    operation_id,
                    timeout,
                })
            }
        }
    }

    async fn thread_state(&self) -> ThreadState {
        let slots = self.slots.lock().await;
        let mut workloads: Vec<u64> = slots.iter().map(|slot| slot.workload).collect();
        {
            let carried = self.carried_workloads.lock();
            if carried.len() > workloads.len() {
                workloads.extend_from_slice(&carried[workloads.len()..]);
            }
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("maxUnits".to_string(), self.config.max_units.to_string());
        metadata.insert(
            "operationsPerUnit".to_string(),
            self.config.operations_per_unit.to_string(),
        );

        ThreadState {
            workloads,
            total_operations: self.total_operations.load(Ordering::Relaxed),
            last_updated: Utc::now(),
            active_unit_count: slots.len(),
            metadata,
        }
    }

    async fn save_state(&self) -> PoolResult<()> {
        let Some((location, password)) = self.config.checkpoint_target() else {
            debug!("No checkpoint location configured, skipping save");
            return Ok(());
        };

        let state = self.thread_state().await;
        let total_operations = state.total_operations;
        let store = self.store.clone();
        let location = location.to_string();
        let password = password.to_string();
        let target = location.clone();

        tokio::task::spawn_blocking(move || store.save_value(&state, &target, &password))
            .await
            .map_err(|e| PoolError::Operation(format!("checkpoint task failed: {e}")))??;

        info!(location, total_operations, "Pool checkpoint saved");
        Ok(())
    }

    async fn load_state(&self) -> bool {
        let Some((location, password)) = self.config.checkpoint_target() else {
            return false;
        };

        let store = self.store.clone();
        let location = location.to_string();
        let password = password.to_string();
        let target = location.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            store.load_value::<ThreadState>(&target, &password)
        })
        .await;

        let state = match loaded {
            Ok(Ok(state)) => state,
            Ok(Err(StateError::NotFound(_))) => {
                debug!(location, "No pool checkpoint yet, starting from zero");
                return false;
            }
            Ok(Err(e)) => {
                warn!(location, error = %e, "Ignoring unreadable pool checkpoint");
                return false;
            }
            Err(e) => {
                warn!(location, error = %e, "Checkpoint load task failed");
                return false;
            }
        };

        let mut slots = self.slots.lock().await;
        for (slot, &workload) in slots.iter_mut().zip(state.workloads.iter()) {
            slot.workload = workload;
        }
        self.total_operations
            .store(state.total_operations, Ordering::Relaxed);
        *self.carried_workloads.lock() = state.workloads;

        info!(
            location,
            total_operations = state.total_operations,
            "Pool checkpoint restored"
        );
        true
    }
}

async fn route_responses<T: fmt::Debug + Send + 'static>(
    mut responses: mpsc::UnboundedReceiver<ResponseEnvelope<T>>,
    pending: PendingMap<T>,
) {
    while let Some(response) = responses.recv().await {
        let Some((_, entry)) = pending.remove(&response.operation_id) else {
            debug!(
                unit_id = response.unit_id,
                operation_id = %response.operation_id,
                "No caller for response, discarding"
            );
            continue;
        };
        entry.in_flight.fetch_sub(1, Ordering::AcqRel);

        match entry.waiter {
            Some(waiter) => {
                if let Err(late) = waiter.send(response) {
                    debug!(
                        unit_id = late.unit_id,
                        operation_id = %late.operation_id,
                        "Caller stopped waiting, discarding late reply"
                    );
                }
            }
            None => {
                if let Err(e) = &response.result {
                    warn!(unit_id = response.unit_id, error = %e, "Replicated operation failed");
                }
            }
        }
    }
}

fn spawn_checkpoint<S: UnitService>(inner: &Arc<PoolInner<S>>) -> Option<JoinHandle<()>> {
    let interval = inner.config.checkpoint_interval;
    if interval.is_zero() || inner.config.checkpoint_target().is_none() {
        return None;
    }

    let weak: Weak<PoolInner<S>> = Arc::downgrade(inner);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if inner.is_draining() {
                break;
            }
            if let Err(e) = inner.save_state().await {
                warn!(error = %e, "Periodic checkpoint failed");
            }
        }
    }))
}

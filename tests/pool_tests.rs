mod common;

use common::test_utils::TestPath;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tiered_bloom::pool::{
    PoolConfig, PoolConfigBuilder, PoolError, UnitFactory, UnitId, UnitRequest,
    UnitService, WorkerPool,
};

#[derive(Debug, Clone)]
enum TestRequest {
    Echo(u64),
    /// Waits until the test releases the gate
    Block,
    Sleep(Duration),
    /// Replicated counter increment
    Bump,
    Read,
    Fail,
    Panic,
}

impl UnitRequest for TestRequest {
    fn action(&self) -> &'static str {
        match self {
            TestRequest::Echo(_) => "echo",
            TestRequest::Block => "block",
            TestRequest::Sleep(_) => "sleep",
            TestRequest::Bump => "bump",
            TestRequest::Read => "read",
            TestRequest::Fail => "fail",
            TestRequest::Panic => "panic",
        }
    }

    fn replicate(&self) -> bool {
        matches!(self, TestRequest::Bump)
    }
}

struct TestService {
    counter: u64,
    gate: Arc<Mutex<mpsc::Receiver<()>>>,
    tally: Arc<Tally>,
    snapshot_delay: Duration,
}

/// What the units of one pool did, summed over all of them
#[derive(Default)]
struct Tally {
    flushes: AtomicUsize,
    snapshots: AtomicUsize,
}

impl Tally {
    fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn snapshots(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

impl UnitService for TestService {
    type Request = TestRequest;
    type Reply = u64;
    type Snapshot = u64;

    fn handle(&mut self, request: TestRequest) -> Result<u64, String> {
        match request {
            TestRequest::Echo(value) => Ok(value),
            TestRequest::Block => {
                let gate = self.gate.lock().map_err(|e| e.to_string())?;
                gate.recv_timeout(Duration::from_secs(10))
                    .map_err(|e| e.to_string())?;
                Ok(0)
            }
            TestRequest::Sleep(duration) => {
                std::thread::sleep(duration);
                Ok(0)
            }
            TestRequest::Bump => {
                self.counter += 1;
                Ok(self.counter)
            }
            TestRequest::Read => Ok(self.counter),
            TestRequest::Fail => Err("boom".to_string()),
            TestRequest::Panic => panic!("kaboom"),
        }
    }

    fn snapshot(&self) -> Option<u64> {
        std::thread::sleep(self.snapshot_delay);
        self.tally.snapshots.fetch_add(1, Ordering::SeqCst);
        Some(self.counter)
    }

    fn flush(&mut self) -> Result<(), String> {
        self.tally.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    pool: WorkerPool<TestService>,
    release: mpsc::Sender<()>,
    tally: Arc<Tally>,
}

fn test_factory(
    gate: Arc<Mutex<mpsc::Receiver<()>>>,
    tally: Arc<Tally>,
    snapshot_delay: Duration,
) -> Arc<dyn UnitFactory<TestService>> {
    Arc::new(
        move |_unit_id: UnitId, seed: Option<u64>| -> Result<TestService, String> {
            Ok(TestService {
                counter: seed.unwrap_or(0),
                gate: Arc::clone(&gate),
                tally: Arc::clone(&tally),
                snapshot_delay,
            })
        },
    )
}

fn harness(config: PoolConfig) -> Harness {
    harness_with_snapshot_delay(config, Duration::ZERO)
}

fn harness_with_snapshot_delay(config: PoolConfig, snapshot_delay: Duration) -> Harness {
    let (release, gate) = mpsc::channel();
    let tally = Arc::new(Tally::default());
    let factory = test_factory(Arc::new(Mutex::new(gate)), Arc::clone(&tally), snapshot_delay);
    let pool = WorkerPool::new(config, factory).expect("Failed to create pool");
    Harness {
        pool,
        release,
        tally,
    }
}

/// Keeps the first unit busy long enough for the next call to add a second
async fn grow_to_two_units(pool: &WorkerPool<TestService>) {
    let slow = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.assign_operation(TestRequest::Sleep(Duration::from_millis(100)))
                .await
        })
    };
    let watched = pool.clone();
    wait_for("slow operation", move || watched.pending_operations() == 1).await;
    pool.assign_operation(TestRequest::Bump).await.unwrap();
    slow.await.unwrap().unwrap();
    assert_eq!(pool.units().await.len(), 2);
}

fn config(max_units: usize, operations_per_unit: u64) -> PoolConfig {
    PoolConfigBuilder::default()
        .max_units(max_units)
        .operations_per_unit(operations_per_unit)
        .operation_timeout(Duration::from_secs(5))
        .shutdown_grace(Duration::from_secs(2))
        .checkpoint_interval(Duration::ZERO)
        .build()
        .expect("Failed to build pool config")
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_round_trip() {
        let h = harness(config(2, 100));
        let done = h.pool.assign_operation(TestRequest::Echo(42)).await.unwrap();
        assert_eq!(done.reply, 42);
        assert_eq!(h.pool.pending_operations(), 0);
        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_capacity_exceeded_when_sole_unit_is_spent_and_busy() {
        let h = harness(config(1, 1));

        let blocked = {
            let pool = h.pool.clone();
            tokio::spawn(async move { pool.assign_operation(TestRequest::Block).await })
        };
        let pool = h.pool.clone();
        wait_for("blocking operation", move || pool.pending_operations() == 1).await;

        let err = h.pool.assign_operation(TestRequest::Echo(1)).await.unwrap_err();
        assert!(
            matches!(err, PoolError::CapacityExceeded { max_units: 1 }),
            "unexpected error: {err:?}"
        );

        h.release.send(()).unwrap();
        let first = blocked.await.unwrap().unwrap();

        // the spent unit is idle now and gets recycled
        let next = h.pool.assign_operation(TestRequest::Echo(2)).await.unwrap();
        assert_eq!(next.reply, 2);
        assert_ne!(next.unit_id, first.unit_id);

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_errors_reach_only_their_caller() {
        let h = harness(config(1, 100));

        match h.pool.assign_operation(TestRequest::Fail).await {
            Err(PoolError::Operation(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected operation error, got {other:?}"),
        }
        match h.pool.assign_operation(TestRequest::Panic).await {
            Err(PoolError::Operation(msg)) => assert!(msg.contains("panicked")),
            other => panic!("expected operation error, got {other:?}"),
        }

        // the unit survives both
        let done = h.pool.assign_operation(TestRequest::Echo(9)).await.unwrap();
        assert_eq!(done.reply, 9);
        assert_eq!(h.pool.units().await.len(), 1);

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_discards_late_reply() {
        let h = harness(config(1, 100));

        let err = h
            .pool
            .assign_operation_with_timeout(TestRequest::Block, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Timeout { .. }), "unexpected error: {err:?}");
        // the unit is not cancelled, its reply is still expected
        assert_eq!(h.pool.pending_operations(), 1);

        h.release.send(()).unwrap();
        let pool = h.pool.clone();
        wait_for("late reply", move || pool.pending_operations() == 0).await;

        let done = h.pool.assign_operation(TestRequest::Echo(7)).await.unwrap();
        assert_eq!(done.reply, 7, "late reply must not leak into a new call");

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_busy_pool_grows_and_replicates() {
        let h = harness(config(2, 1000));

        let slow = {
            let pool = h.pool.clone();
            tokio::spawn(async move {
                pool.assign_operation(TestRequest::Sleep(Duration::from_millis(100)))
                    .await
            })
        };
        let pool = h.pool.clone();
        wait_for("slow operation", move || pool.pending_operations() == 1).await;

        // sole unit is busy, so a second one joins, seeded from the first
        let bumped = h.pool.assign_operation(TestRequest::Bump).await.unwrap();
        assert_eq!(bumped.reply, 1);
        slow.await.unwrap().unwrap();
        assert_eq!(h.pool.units().await.len(), 2);

        let mut seen = HashSet::new();
        for _ in 0..6 {
            let read = h.pool.assign_operation(TestRequest::Read).await.unwrap();
            assert_eq!(read.reply, 1, "unit {} missed the bump", read.unit_id);
            seen.insert(read.unit_id);
        }
        assert_eq!(seen.len(), 2, "reads should spread over both units");

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_growth_queues_on_busy_unit() {
        let config = PoolConfigBuilder::default()
            .max_units(2)
            .operations_per_unit(100)
            .operation_timeout(Duration::from_millis(400))
            .shutdown_grace(Duration::from_secs(2))
            .checkpoint_interval(Duration::ZERO)
            .build()
            .expect("Failed to build pool config");
        // seeding a newcomer takes longer than the operation timeout
        let h = harness_with_snapshot_delay(config, Duration::from_millis(500));

        let slow = {
            let pool = h.pool.clone();
            tokio::spawn(async move {
                pool.assign_operation_with_timeout(
                    TestRequest::Sleep(Duration::from_millis(600)),
                    Duration::from_secs(5),
                )
                .await
            })
        };
        let pool = h.pool.clone();
        wait_for("slow operation", move || pool.pending_operations() == 1).await;

        let done = h.pool.assign_operation(TestRequest::Echo(7)).await.unwrap();
        assert_eq!(done.reply, 7);
        let first = slow.await.unwrap().unwrap();
        assert_eq!(done.unit_id, first.unit_id, "queued behind the busy unit");
        assert_eq!(h.pool.units().await.len(), 1);
        // the abandoned snapshot request was skipped by the unit
        assert_eq!(h.tally.snapshots(), 0);

        h.pool.terminate_all().await.unwrap();
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_recycling_keeps_counters() {
        let h = harness(config(1, 3));

        let mut first_unit = None;
        for expected in 1..=3 {
            let done = h.pool.assign_operation(TestRequest::Bump).await.unwrap();
            assert_eq!(done.reply, expected);
            first_unit.get_or_insert(done.unit_id);
        }

        let units = h.pool.units().await;
        assert_eq!(units[0].assigned, 3);

        let read = h.pool.assign_operation(TestRequest::Read).await.unwrap();
        assert_ne!(Some(read.unit_id), first_unit, "budget spent, unit must be replaced");
        assert_eq!(read.reply, 3, "replacement starts from the old unit's state");

        let state = h.pool.thread_state().await;
        assert_eq!(state.workloads, vec![4]);
        assert_eq!(state.total_operations, 4);
        assert_eq!(state.active_unit_count, 1);
        assert_eq!(h.pool.units().await[0].assigned, 1);
        // the snapshot carried the state over, the retired unit did not flush
        assert_eq!(h.tally.snapshots(), 1);
        assert_eq!(h.tally.flushes(), 0);

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_unit_removes_bookkeeping() {
        let h = harness(config(1, 100));
        h.pool.assign_operation(TestRequest::Bump).await.unwrap();

        assert!(h.pool.terminate_unit(0).await.unwrap());
        assert!(h.pool.units().await.is_empty());
        assert_eq!(h.tally.flushes(), 1);

        assert!(matches!(
            h.pool.terminate_unit(0).await,
            Err(PoolError::InvalidIndex { index: 0, len: 0 })
        ));

        // a unit without siblings starts from scratch
        let read = h.pool.assign_operation(TestRequest::Read).await.unwrap();
        assert_eq!(read.reply, 0);

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_all_drains() {
        let h = harness(config(2, 100));
        h.pool.assign_operation(TestRequest::Echo(1)).await.unwrap();

        h.pool.terminate_all().await.unwrap();
        assert!(h.pool.is_draining());
        assert!(h.pool.units().await.is_empty());
        assert_eq!(h.tally.flushes(), 1);

        assert!(matches!(
            h.pool.assign_operation(TestRequest::Echo(2)).await,
            Err(PoolError::ShuttingDown)
        ));
        // second call is a no-op
        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_all_reaches_every_unit() {
        let h = harness(config(1, 100));
        h.pool.assign_operation(TestRequest::Echo(1)).await.unwrap();
        h.pool.flush_all().await.unwrap();
        assert_eq!(h.tally.flushes(), 1);
        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_writes_state_once_for_all_replicas() {
        let h = harness(config(2, 100));
        grow_to_two_units(&h.pool).await;

        h.pool.terminate_all().await.unwrap();
        assert_eq!(h.tally.flushes(), 1, "replicas must not race on the same state");
    }

    #[tokio::test]
    async fn test_removed_replica_flushes_before_returning_only() {
        let h = harness(config(2, 100));
        grow_to_two_units(&h.pool).await;

        assert!(h.pool.terminate_unit(0).await.unwrap());
        assert_eq!(h.tally.flushes(), 1);

        // the survivor still works and is the only one writing at shutdown
        let read = h.pool.assign_operation(TestRequest::Read).await.unwrap();
        assert_eq!(read.reply, 1);
        h.pool.terminate_all().await.unwrap();
        assert_eq!(h.tally.flushes(), 2);
    }

    #[tokio::test]
    async fn test_factory_failure_is_startup_error() {
        let factory: Arc<dyn UnitFactory<TestService>> = Arc::new(
            |_unit_id: UnitId, _seed: Option<u64>| -> Result<TestService, String> {
                Err("no resources".to_string())
            },
        );
        let pool = WorkerPool::new(config(1, 10), factory).unwrap();
        match pool.assign_operation(TestRequest::Echo(1)).await {
            Err(PoolError::UnitStartup(msg)) => assert_eq!(msg, "no resources"),
            other => panic!("expected startup error, got {other:?}"),
        }
        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (_release, gate) = mpsc::channel();
        let factory = test_factory(
            Arc::new(Mutex::new(gate)),
            Arc::new(Tally::default()),
            Duration::ZERO,
        );
        let result = WorkerPool::new(config(0, 10), factory);
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }
}

#[cfg(test)]
mod checkpoint_tests {
    use super::*;
    use tiered_bloom::StateStore;

    fn checkpoint_config(location: &str, interval: Duration) -> PoolConfig {
        PoolConfigBuilder::default()
            .max_units(1)
            .operations_per_unit(100)
            .checkpoint_interval(interval)
            .checkpoint_location(location)
            .password("checkpoint-pw")
            .build()
            .expect("Failed to build pool config")
    }

    #[tokio::test]
    async fn test_save_and_restore_counters() {
        let test_path = TestPath::new("pool_checkpoint");
        let location = test_path.sibling("pool");

        let h = harness(checkpoint_config(&location, Duration::ZERO));
        for _ in 0..3 {
            h.pool.assign_operation(TestRequest::Echo(0)).await.unwrap();
        }
        // terminate_all persists the counters
        h.pool.terminate_all().await.unwrap();

        let h = harness(checkpoint_config(&location, Duration::ZERO));
        assert!(h.pool.load_state().await);
        let state = h.pool.thread_state().await;
        assert_eq!(state.total_operations, 3);
        assert_eq!(state.workloads, vec![3]);
        assert_eq!(state.active_unit_count, 0);

        h.pool.assign_operation(TestRequest::Echo(0)).await.unwrap();
        let state = h.pool.thread_state().await;
        assert_eq!(state.total_operations, 4);
        assert_eq!(state.workloads, vec![4]);

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_is_best_effort() {
        let test_path = TestPath::new("pool_checkpoint_missing");
        let location = test_path.sibling("pool");

        let h = harness(checkpoint_config(&location, Duration::ZERO));
        assert!(!h.pool.load_state().await, "missing checkpoint");

        std::fs::create_dir_all(test_path.path().parent().unwrap()).unwrap();
        std::fs::write(&location, "garbage").unwrap();
        assert!(!h.pool.load_state().await, "unreadable checkpoint");

        let state = h.pool.thread_state().await;
        assert_eq!(state.total_operations, 0);
        assert!(state.workloads.is_empty());

        h.pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_checkpoint_writes_file() {
        let test_path = TestPath::new("pool_checkpoint_periodic");
        let location = test_path.sibling("pool");

        let h = harness(checkpoint_config(&location, Duration::from_millis(100)));
        h.pool.assign_operation(TestRequest::Echo(0)).await.unwrap();

        let store = StateStore::file();
        let watched = location.clone();
        wait_for("periodic checkpoint", move || store.exists(&watched).unwrap_or(false)).await;

        let saved: tiered_bloom::ThreadState = StateStore::file()
            .load_value(&location, "checkpoint-pw")
            .unwrap();
        assert_eq!(saved.total_operations, 1);

        h.pool.terminate_all().await.unwrap();
    }
}

#[cfg(test)]
mod filter_pool_tests {
    use super::*;
    use tiered_bloom::{
        BloomFilter, FilterConfig, FilterConfigBuilder, FilterPool, InitOptions, StateStore,
    };

    fn template(expected_elements: usize) -> FilterConfig {
        FilterConfigBuilder::default()
            .expected_elements(expected_elements)
            .build()
            .expect("Failed to build filter config")
    }

    fn options(expected_elements: usize) -> InitOptions {
        InitOptions {
            expected_elements,
            false_positive_rate: 0.01,
            ..InitOptions::default()
        }
    }

    fn persistent_options(location: &str) -> InitOptions {
        InitOptions {
            state_path: Some(location.to_string()),
            password: Some("filter-pw".to_string()),
            ..options(1000)
        }
    }

    fn start(max_units: usize, operations_per_unit: u64) -> FilterPool {
        FilterPool::start(
            config(max_units, operations_per_unit),
            template(1000),
            StateStore::file(),
        )
        .expect("Failed to start filter pool")
    }

    #[tokio::test]
    async fn test_add_and_check() {
        let pool = start(2, 1000);
        pool.initialize(options(1000)).await.unwrap();

        assert!(pool.add("alice").await.unwrap());
        assert!(!pool.add("alice").await.unwrap(), "second add is a no-op");
        assert!(pool.check_exists("alice").await.unwrap());
        assert!(!pool.check_exists("mallory").await.unwrap());

        let added = pool.add_all(&["bob", "carol", "alice"]).await.unwrap();
        assert_eq!(added, 2);

        let stats = pool.stats().await.unwrap();
        assert_eq!(stats.hash_count, 7);
        assert!(stats.set_bits > 0);

        // nothing to persist to
        assert!(!pool.save().await.unwrap());

        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_uninitialized_filter_errors() {
        let pool = start(1, 1000);
        assert!(matches!(
            pool.check_exists("alice").await,
            Err(PoolError::Operation(_))
        ));
        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_recycled_units_keep_members() {
        let pool = start(1, 3);
        pool.initialize(options(100)).await.unwrap();
        pool.add("alice").await.unwrap();
        pool.add("bob").await.unwrap();

        let before = pool.pool().units().await[0].unit_id;
        assert!(pool.check_exists("alice").await.unwrap());
        assert!(pool.check_exists("bob").await.unwrap());
        assert_ne!(pool.pool().units().await[0].unit_id, before);

        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_recycled_units_reload_durable_snapshot() {
        let test_path = TestPath::new("filter_pool_recycle");
        let location = test_path.path_string();

        let pool = start(1, 3);
        pool.initialize(persistent_options(&location)).await.unwrap();
        pool.add("alice").await.unwrap();
        pool.add("bob").await.unwrap();

        // budget spent, the replacement loads what its predecessor saved
        assert!(pool.check_exists("alice").await.unwrap());
        assert!(StateStore::file().exists(&location).unwrap());

        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let test_path = TestPath::new("filter_pool_restart");
        let location = test_path.path_string();

        let pool = start(2, 1000);
        pool.initialize(persistent_options(&location)).await.unwrap();
        pool.add("alice").await.unwrap();
        assert!(pool.save().await.unwrap());
        pool.terminate_all().await.unwrap();

        let pool = start(2, 1000);
        pool.initialize(persistent_options(&location)).await.unwrap();
        assert!(pool.check_exists("alice").await.unwrap());
        pool.terminate_all().await.unwrap();

        // load_existing off starts empty
        let pool = start(1, 1000);
        pool.initialize(InitOptions {
            load_existing: false,
            ..persistent_options(&location)
        })
        .await
        .unwrap();
        assert!(!pool.check_exists("alice").await.unwrap());
        pool.terminate_all().await.unwrap();
    }

    fn roomy_options(location: &str) -> InitOptions {
        InitOptions {
            expected_elements: 200_000,
            ..persistent_options(location)
        }
    }

    /// Bulk-loads the only replica and adds `alice` while it is busy, which
    /// brings a second replica in. Returns the bulk keys.
    async fn grow_to_two_replicas(pool: &FilterPool) -> Vec<String> {
        let bulk: Vec<String> = (0..100_000).map(|i| format!("bulk-{i}")).collect();
        let busy = {
            let pool = pool.clone();
            let bulk = bulk.clone();
            tokio::spawn(async move { pool.add_all(&bulk).await })
        };
        let watched = pool.clone();
        wait_for("bulk insert", move || watched.pool().pending_operations() == 1).await;

        pool.add("alice").await.unwrap();
        busy.await.unwrap().unwrap();
        assert_eq!(pool.pool().units().await.len(), 2);
        bulk
    }

    async fn assert_restored(location: &str, members: &[&str]) {
        let pool = start(1, 1000);
        pool.initialize(roomy_options(location)).await.unwrap();
        for member in members {
            assert!(pool.check_exists(member).await.unwrap(), "{member} lost");
        }
        assert!(!pool.check_exists("mallory").await.unwrap());
        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_replicas_persist_on_shutdown() {
        let test_path = TestPath::new("filter_pool_replicas");
        let location = test_path.path_string();

        let pool = start(2, 1000);
        pool.initialize(roomy_options(&location)).await.unwrap();
        let bulk = grow_to_two_replicas(&pool).await;
        pool.add("bob").await.unwrap();
        pool.terminate_all().await.unwrap();

        let last = bulk.last().unwrap().as_str();
        assert_restored(&location, &["alice", "bob", bulk[0].as_str(), last]).await;
    }

    #[tokio::test]
    async fn test_removed_replica_keeps_later_writes() {
        let test_path = TestPath::new("filter_pool_remove_replica");
        let location = test_path.path_string();

        let pool = start(2, 1000);
        pool.initialize(roomy_options(&location)).await.unwrap();
        grow_to_two_replicas(&pool).await;

        pool.pool().terminate_unit(0).await.unwrap();
        assert!(StateStore::file().exists(&location).unwrap());
        pool.add("carol").await.unwrap();
        pool.terminate_all().await.unwrap();

        // the removed replica never knew carol and must not have overwritten her
        assert_restored(&location, &["alice", "carol"]).await;
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_fails_initialize() {
        let test_path = TestPath::new("filter_pool_corrupt");
        let location = test_path.path_string();
        std::fs::create_dir_all(test_path.path().parent().unwrap()).unwrap();
        std::fs::write(&location, "not an encrypted snapshot").unwrap();

        let pool = start(1, 1000);
        assert!(pool.initialize(persistent_options(&location)).await.is_err());
        pool.terminate_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_replaces_contents() {
        let mut source = BloomFilter::new(template(1000)).unwrap();
        source.add("imported").unwrap();

        let pool = start(2, 1000);
        pool.initialize(options(1000)).await.unwrap();
        pool.add("local").await.unwrap();
        pool.restore(source.export_state()).await.unwrap();

        assert!(pool.check_exists("imported").await.unwrap());
        assert!(!pool.check_exists("local").await.unwrap());
        pool.terminate_all().await.unwrap();
    }
}

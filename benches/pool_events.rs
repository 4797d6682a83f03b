//! Pool event handling and pick benchmarks.
//!
//! Benchmarks the two hot paths at different pool sizes:
//! - State change churn applied to a `ConnectionPool`
//! - Picks against a published picker, with and without affinity
//!
//! Run with: cargo bench --bench pool_events
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use affinity_balancer::{
    Address, AffinityCommand, BalancerConfig, ChannelController, ConnectionId, ConnectionPool,
    ConnectivityState, DoneInfo, NewConnectionOptions, PickInfo, Picker, PoolEvent, Result,
    SubConnection,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use parking_lot::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const POOL_SIZES: &[usize] = &[1, 10, 100];

// ============================================================================
// Null Runtime
// ============================================================================

#[derive(Debug)]
struct NullConnection(ConnectionId);

impl SubConnection for NullConnection {
    fn id(&self) -> ConnectionId {
        self.0
    }

    fn update_addresses(&self, _addresses: &[Address]) {}

    fn connect(&self) {}
}

#[derive(Default)]
struct NullController {
    created: Mutex<Vec<ConnectionId>>,
}

impl ChannelController for NullController {
    fn new_connection(
        &self,
        _addresses: &[Address],
        _options: NewConnectionOptions,
    ) -> Result<Arc<dyn SubConnection>> {
        let id = ConnectionId::next();
        self.created.lock().push(id);
        Ok(Arc::new(NullConnection(id)))
    }

    fn update_state(&self, _state: ConnectivityState, _picker: Arc<Picker>) {}
}

/// Pool with `size` Ready connections.
fn ready_pool(
    size: usize,
) -> (
    ConnectionPool,
    Vec<ConnectionId>,
    mpsc::UnboundedSender<PoolEvent>,
) {
    let controller = Arc::new(NullController::default());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let config = BalancerConfig::default().with_max_connections(0);
    let mut pool = ConnectionPool::new(controller.clone(), config, events_tx.downgrade());

    pool.on_resolved_addresses(Ok(vec![Address::new("10.0.0.1:443")]));
    for _ in 1..size {
        pool.create_connection();
    }

    let ids = controller.created.lock().clone();
    for id in &ids {
        pool.on_connection_state_change(*id, ConnectivityState::Connecting);
        pool.on_connection_state_change(*id, ConnectivityState::Ready);
    }

    (pool, ids, events_tx)
}

// ============================================================================
// Benchmark: State Change Churn
// ============================================================================

fn bench_state_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_churn");

    for &size in POOL_SIZES {
        group.bench_with_input(BenchmarkId::new("flap", size), &size, |b, &size| {
            let (mut pool, ids, _events) = ready_pool(size);
            let target = ids[ids.len() / 2];
            b.iter(|| {
                pool.on_connection_state_change(target, ConnectivityState::TransientFailure);
                pool.on_connection_state_change(target, ConnectivityState::Ready);
                black_box(pool.state());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Picks
// ============================================================================

fn bench_picks(c: &mut Criterion) {
    let mut group = c.benchmark_group("pick");

    for &size in POOL_SIZES {
        group.bench_with_input(BenchmarkId::new("least_busy", size), &size, |b, &size| {
            let (pool, _ids, _events) = ready_pool(size);
            let picker = pool.picker();
            let info = PickInfo::default();
            b.iter(|| {
                if let Ok(result) = picker.pick(black_box(&info)) {
                    result.complete(DoneInfo::default());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("bound", size), &size, |b, &size| {
            let (mut pool, ids, _events) = ready_pool(size);
            pool.bind_affinity("sessions/bench", ids[0]);
            let picker = pool.picker();
            let info = PickInfo::new("sessions/bench", AffinityCommand::Bound);
            b.iter(|| {
                if let Ok(result) = picker.pick(black_box(&info)) {
                    result.complete(DoneInfo::default());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_state_churn, bench_picks);
criterion_main!(benches);

//! Simulated channel - drives a balancer with a fake runtime.
//!
//! Connections "dial" on a timer, report Connecting then Ready, and one of
//! them later fails. Sessions are bound on first use and routed stickily
//! afterwards.
//!
//! Usage:
//!   cargo run --example simulated_channel
//!   cargo run --example simulated_channel -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use affinity_balancer::{
    Address, AffinityCommand, Balancer, ChannelController, ConnectionId, ConnectivityState,
    DoneInfo, NewConnectionOptions, PickInfo, Picker, Result, SubConnection,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Simulated Runtime
// ============================================================================

type StateReport = (ConnectionId, ConnectivityState);

#[derive(Debug)]
struct SimConnection {
    id: ConnectionId,
    reports: mpsc::UnboundedSender<StateReport>,
}

impl SubConnection for SimConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn update_addresses(&self, addresses: &[Address]) {
        println!("  {} now dials {:?}", self.id, addresses);
    }

    fn connect(&self) {
        let id = self.id;
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let _ = reports.send((id, ConnectivityState::Connecting));
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = reports.send((id, ConnectivityState::Ready));
        });
    }
}

struct SimController {
    reports: mpsc::UnboundedSender<StateReport>,
}

impl ChannelController for SimController {
    fn new_connection(
        &self,
        addresses: &[Address],
        options: NewConnectionOptions,
    ) -> Result<Arc<dyn SubConnection>> {
        let id = ConnectionId::next();
        println!(
            "  runtime: new connection {id} to {} address(es), health check {}",
            addresses.len(),
            options.health_check_enabled
        );
        Ok(Arc::new(SimConnection {
            id,
            reports: self.reports.clone(),
        }))
    }

    fn update_state(&self, state: ConnectivityState, picker: Arc<Picker>) {
        println!(
            "  runtime: state {state}, picker {:?} over {:?}",
            picker.kind(),
            picker.ready_connections()
        );
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel::<StateReport>();
    let controller = Arc::new(SimController {
        reports: reports_tx.clone(),
    });

    let balancer = Balancer::builder().max_streams(2).build(controller)?;

    // Forward connection reports into the balancer.
    let forwarder = {
        let balancer = balancer.clone();
        tokio::spawn(async move {
            while let Some((id, state)) = reports_rx.recv().await {
                if balancer.on_connection_state_change(id, state).is_err() {
                    break;
                }
            }
        })
    };

    println!("[1] Resolving addresses");
    balancer.on_resolved_addresses(Ok(vec![
        Address::new("10.0.0.1:443"),
        Address::new("10.0.0.2:443"),
    ]))?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("    aggregate: {}", balancer.state());

    println!("[2] Binding sessions");
    for session in ["sessions/alpha", "sessions/beta"] {
        let result = balancer.pick(&PickInfo::new(session, AffinityCommand::Bind))?;
        println!("    {session} -> {}", result.connection_id());
        result.complete(DoneInfo::default());
    }

    println!("[3] Saturating streams to grow the pool");
    let mut in_flight = Vec::new();
    for _ in 0..3 {
        match balancer.pick(&PickInfo::default()) {
            Ok(result) => in_flight.push(result),
            Err(e) if e.is_recoverable() => println!("    pick deferred: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    for result in in_flight {
        result.complete(DoneInfo::default());
    }

    println!("[4] Sticky routing");
    for _ in 0..3 {
        let result = balancer.pick(&PickInfo::new("sessions/alpha", AffinityCommand::Bound))?;
        println!("    sessions/alpha -> {}", result.connection_id());
        result.complete(DoneInfo::default());
    }

    println!("[5] Resolver error keeps the pool");
    balancer.on_resolved_addresses(Err(affinity_balancer::Error::resolution("SERVFAIL")))?;

    let stats = balancer.stats().await?;
    println!(
        "    {} connection(s), {} ready, {} affinity key(s), aggregate {}",
        stats.connections, stats.ready_connections, stats.affinity_keys, stats.state
    );

    balancer.close().await;
    drop(reports_tx);
    forwarder.abort();

    println!("Done");
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "affinity_balancer=debug"
    } else {
        "affinity_balancer=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

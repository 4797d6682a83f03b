//! The balancer handle and its event loop.
//!
//! # Event Loop
//!
//! [`Balancer::spawn`] moves a [`ConnectionPool`] into a tokio task that
//! drains one unbounded queue. Resolver updates, state changes, affinity
//! binds, scale-up requests and close all go through it, so the pool is only
//! ever touched by that task.
//!
//! Pickers are read without touching the queue: the pool swaps each new
//! [`ChannelSnapshot`] into a shared [`ArcSwap`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::picker::{PickInfo, PickResult, Picker};
use crate::pool::{ChannelSnapshot, ConnectionPool, PoolEvent, PoolStats};
use crate::state::ConnectivityState;
use crate::transport::{Address, ChannelController};

use super::builder::BalancerBuilder;
use super::config::BalancerConfig;

// ============================================================================
// Balancer
// ============================================================================

/// Handle to a running balancer.
///
/// Cheap to clone. Every mutating call only enqueues an event and returns
/// immediately.
#[derive(Clone)]
pub struct Balancer {
    /// Queue into the event loop.
    events: mpsc::UnboundedSender<PoolEvent>,
    /// Last published state and picker.
    current: Arc<ArcSwap<ChannelSnapshot>>,
    /// Event loop task, taken by the first `close`.
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

// ============================================================================
// Balancer - Constructor
// ============================================================================

impl Balancer {
    /// Creates a builder with the default configuration.
    #[inline]
    #[must_use]
    pub fn builder() -> BalancerBuilder {
        BalancerBuilder::new()
    }

    /// Starts the event loop on `runtime`.
    pub(crate) fn spawn(
        runtime: &Handle,
        controller: Arc<dyn ChannelController>,
        config: BalancerConfig,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let pool = ConnectionPool::new(controller, config, events.downgrade());
        let current = pool.snapshot_cell();

        let task = runtime.spawn(run_event_loop(pool, events_rx));

        info!("Balancer started");

        Self {
            events,
            current,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

// ============================================================================
// Balancer - Runtime Notifications
// ============================================================================

impl Balancer {
    /// Delivers resolver output.
    ///
    /// Pass the resolver's error as `Err`; the pool keeps its previous
    /// addresses in that case.
    ///
    /// # Errors
    ///
    /// [`Error::BalancerClosed`] if the balancer was closed.
    pub fn on_resolved_addresses(&self, update: Result<Vec<Address>>) -> Result<()> {
        self.send(PoolEvent::ResolvedAddresses(update))
    }

    /// Delivers a connection state transition.
    ///
    /// # Errors
    ///
    /// [`Error::BalancerClosed`] if the balancer was closed.
    pub fn on_connection_state_change(
        &self,
        connection_id: ConnectionId,
        state: ConnectivityState,
    ) -> Result<()> {
        self.send(PoolEvent::StateChange {
            connection_id,
            state,
        })
    }
}

// ============================================================================
// Balancer - Affinity
// ============================================================================

impl Balancer {
    /// Binds `key` to a connection.
    ///
    /// Each bind must be paired with one [`unbind_affinity`](Self::unbind_affinity).
    ///
    /// # Errors
    ///
    /// [`Error::BalancerClosed`] if the balancer was closed.
    pub fn bind_affinity(
        &self,
        key: impl Into<String>,
        connection_id: ConnectionId,
    ) -> Result<()> {
        self.send(PoolEvent::Bind {
            key: key.into(),
            connection_id,
        })
    }

    /// Releases one binding of `key`.
    ///
    /// # Errors
    ///
    /// [`Error::BalancerClosed`] if the balancer was closed.
    pub fn unbind_affinity(&self, key: impl Into<String>) -> Result<()> {
        self.send(PoolEvent::Unbind { key: key.into() })
    }
}

// ============================================================================
// Balancer - Routing
// ============================================================================

impl Balancer {
    /// Last published picker.
    #[inline]
    #[must_use]
    pub fn picker(&self) -> Arc<Picker> {
        Arc::clone(&self.current.load().picker)
    }

    /// Last published aggregate state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        self.current.load().state
    }

    /// Picks with the current picker.
    ///
    /// # Errors
    ///
    /// See [`Picker::pick`].
    pub fn pick(&self, info: &PickInfo) -> Result<PickResult> {
        self.current.load().picker.pick(info)
    }
}

// ============================================================================
// Balancer - Lifecycle
// ============================================================================

impl Balancer {
    /// Returns pool counters once every event queued before this call has
    /// been applied.
    ///
    /// # Errors
    ///
    /// [`Error::BalancerClosed`] if the balancer was closed.
    pub async fn stats(&self) -> Result<PoolStats> {
        let (tx, rx) = oneshot::channel();
        self.send(PoolEvent::Stats(tx))?;
        rx.await.map_err(|_| Error::BalancerClosed)
    }

    /// Closes the pool and waits for the event loop to exit.
    ///
    /// Idempotent. Further calls on any clone return
    /// [`Error::BalancerClosed`].
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.events.send(PoolEvent::Close(tx)).is_ok() {
            let _ = rx.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Balancer event loop panicked");
        }
    }

    fn send(&self, event: PoolEvent) -> Result<()> {
        self.events.send(event).map_err(|_| Error::BalancerClosed)
    }
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("state", &self.state())
            .field("closed", &self.events.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Applies queued events to `pool` until close, or until every handle is
/// dropped.
async fn run_event_loop(
    mut pool: ConnectionPool,
    mut events_rx: mpsc::UnboundedReceiver<PoolEvent>,
) {
    debug!("Event loop started");

    while let Some(event) = events_rx.recv().await {
        match event {
            PoolEvent::ResolvedAddresses(update) => pool.on_resolved_addresses(update),

            PoolEvent::StateChange {
                connection_id,
                state,
            } => pool.on_connection_state_change(connection_id, state),

            PoolEvent::Bind { key, connection_id } => pool.bind_affinity(&key, connection_id),

            PoolEvent::Unbind { key } => pool.unbind_affinity(&key),

            PoolEvent::ScaleUp => pool.scale_up(),

            PoolEvent::Stats(reply) => {
                let _ = reply.send(pool.stats());
            }

            PoolEvent::Close(ack) => {
                events_rx.close();
                pool.close();
                let _ = ack.send(());
                info!("Balancer closed");
                return;
            }
        }
    }

    pool.close();
    debug!("All balancer handles dropped, event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================

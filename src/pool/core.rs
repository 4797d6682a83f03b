//! The connection pool state machine.
//!
//! [`ConnectionPool`] is plain synchronous state with no locking. The
//! balancer's event loop owns it and feeds it one [`PoolEvent`] at a time,
//! which is what makes the lock-free bookkeeping sound.
//!
//! [`PoolEvent`]: super::PoolEvent

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, error, info, trace, warn};

use crate::balancer::BalancerConfig;
use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::picker::{AffinityPicker, PickFailure, Picker, ReadyConnection};
use crate::state::{ConnectivityState, StateEvaluator};
use crate::transport::{Address, ChannelController};

use super::affinity::{AffinityTable, AffinityView, BindOutcome};
use super::connection_ref::{ConnectionRef, ConnectionSet, TransitionEffect};
use super::event::EventSender;

// ============================================================================
// ChannelSnapshot
// ============================================================================

/// The aggregate state and picker last published.
///
/// Swapped as one value so readers never see a state paired with the wrong
/// picker.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    /// Aggregate connectivity state.
    pub state: ConnectivityState,
    /// Picker for new requests.
    pub picker: Arc<Picker>,
}

// ============================================================================
// PoolStats
// ============================================================================

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections in the working set.
    pub connections: usize,
    /// Connections currently Ready.
    pub ready_connections: usize,
    /// Bound affinity keys.
    pub affinity_keys: usize,
    /// Aggregate connectivity state.
    pub state: ConnectivityState,
}

// ============================================================================
// Republication Rule
// ============================================================================

/// Whether a transition requires a new picker.
///
/// True when this connection's readiness flipped, or when the aggregate
/// entered or left `TransientFailure`.
#[must_use]
pub fn should_republish(
    old_state: ConnectivityState,
    new_state: ConnectivityState,
    old_aggregate: ConnectivityState,
    new_aggregate: ConnectivityState,
) -> bool {
    old_state.is_ready() != new_state.is_ready()
        || old_aggregate.is_transient_failure() != new_aggregate.is_transient_failure()
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Pool of backend connections with affinity bindings.
pub struct ConnectionPool {
    controller: Arc<dyn ChannelController>,
    config: BalancerConfig,
    addresses: Vec<Address>,
    connections: ConnectionSet,
    affinity: AffinityTable,
    evaluator: StateEvaluator,
    state: ConnectivityState,
    current: Arc<ArcSwap<ChannelSnapshot>>,
    affinity_view: Arc<ArcSwap<AffinityView>>,
    events: EventSender,
    /// Set when a scale-up could not create a connection.
    growth_blocked: bool,
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Creates an empty pool in `Idle`.
    ///
    /// The initial picker fails every pick with
    /// [`Error::NoSubchannelAvailable`](crate::Error::NoSubchannelAvailable).
    /// `events` is handed to pickers so they can report binds and request
    /// more connections.
    pub fn new(
        controller: Arc<dyn ChannelController>,
        config: BalancerConfig,
        events: EventSender,
    ) -> Self {
        let initial = ChannelSnapshot {
            state: ConnectivityState::Idle,
            picker: Arc::new(Picker::Failing(PickFailure::NoSubchannelAvailable)),
        };

        Self {
            controller,
            config,
            addresses: Vec::new(),
            connections: ConnectionSet::default(),
            affinity: AffinityTable::new(),
            evaluator: StateEvaluator::new(),
            state: ConnectivityState::Idle,
            current: Arc::new(ArcSwap::from_pointee(initial)),
            affinity_view: Arc::new(ArcSwap::from_pointee(AffinityView::default())),
            events,
            growth_blocked: false,
        }
    }
}

// ============================================================================
// ConnectionPool - Accessors
// ============================================================================

impl ConnectionPool {
    /// Shared cell holding the last published snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot_cell(&self) -> Arc<ArcSwap<ChannelSnapshot>> {
        Arc::clone(&self.current)
    }

    /// Aggregate connectivity state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Last published picker.
    #[inline]
    #[must_use]
    pub fn picker(&self) -> Arc<Picker> {
        Arc::clone(&self.current.load().picker)
    }

    /// Current resolved addresses.
    #[inline]
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Number of connections in the working set.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Looks up a connection by ID.
    #[inline]
    #[must_use]
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&ConnectionRef> {
        self.connections.get(&connection_id)
    }

    /// The affinity table.
    #[inline]
    #[must_use]
    pub fn affinity(&self) -> &AffinityTable {
        &self.affinity
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            connections: self.connections.len(),
            ready_connections: self.evaluator.ready_count(),
            affinity_keys: self.affinity.len(),
            state: self.state,
        }
    }
}

// ============================================================================
// ConnectionPool - Resolver & Connections
// ============================================================================

impl ConnectionPool {
    /// Handles resolver output.
    ///
    /// A resolver error keeps the previous addresses and connections. With an
    /// empty pool exactly one connection is created; otherwise every existing
    /// connection gets the new addresses and a connect request. Never
    /// republishes.
    pub fn on_resolved_addresses(&mut self, update: Result<Vec<Address>>) {
        let addresses = match update {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(error = %e, "Resolver reported an error, keeping current addresses");
                return;
            }
        };

        info!(count = addresses.len(), ?addresses, "Got new resolved addresses");
        self.addresses = addresses;
        self.growth_blocked = false;

        if self.connections.is_empty() {
            self.create_connection();
            return;
        }

        for conn in self.connections.values() {
            conn.handle().update_addresses(&self.addresses);
            conn.handle().connect();
        }
    }

    /// Asks the runtime for one more connection and starts connecting it.
    ///
    /// Returns the new connection's ID. On failure the pool stays one short
    /// until the next resolver update.
    pub fn create_connection(&mut self) -> Option<ConnectionId> {
        let options = self.config.connection_options();

        let handle = match self.controller.new_connection(&self.addresses, options) {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Failed to create connection");
                return None;
            }
        };

        let connection_id = handle.id();
        self.connections
            .insert(connection_id, ConnectionRef::new(Arc::clone(&handle)));
        handle.connect();

        debug!(
            connection_id = %connection_id,
            pool_size = self.connections.len(),
            "Connection created"
        );

        Some(connection_id)
    }

    /// Grows the pool by one if it is below the connection limit.
    ///
    /// Always republishes: the requesting picker fails saturated picks until
    /// it is replaced. If the connection cannot be created, pickers use the least
    /// busy connection instead of asking again until the next resolver
    /// update.
    pub fn scale_up(&mut self) {
        if !self.config.allows_more_connections(self.connections.len()) {
            trace!(
                pool_size = self.connections.len(),
                "Scale-up ignored, pool at capacity"
            );
        } else if self.create_connection().is_none() {
            warn!(
                pool_size = self.connections.len(),
                "Scale-up failed, routing over existing connections"
            );
            self.growth_blocked = true;
        }

        self.regenerate_picker();
    }
}

// ============================================================================
// ConnectionPool - Affinity
// ============================================================================

impl ConnectionPool {
    /// Binds `key` to `connection_id`.
    ///
    /// See [`AffinityTable::bind`] for the counting rules.
    pub fn bind_affinity(&mut self, key: &str, connection_id: ConnectionId) {
        match self.affinity.bind(key, connection_id, &mut self.connections) {
            Ok(BindOutcome::Inserted) => {
                debug!(key, connection_id = %connection_id, "Affinity key bound");
                self.publish_affinity();
            }
            Ok(BindOutcome::Incremented(bound_id)) => {
                trace!(key, connection_id = %bound_id, "Affinity key rebound");
            }
            Err(e) => {
                warn!(key, error = %e, "Cannot bind affinity key");
            }
        }
    }

    /// Releases one binding of `key`.
    pub fn unbind_affinity(&mut self, key: &str) {
        if self.affinity.unbind(key, &mut self.connections) {
            debug!(key, "Affinity key unbound");
            self.publish_affinity();
        }
    }

    fn publish_affinity(&self) {
        self.affinity_view.store(self.affinity.view());
    }
}

// ============================================================================
// ConnectionPool - State Changes
// ============================================================================

impl ConnectionPool {
    /// Applies a connection's state transition.
    ///
    /// Unknown connections are ignored. Publishes a new picker when
    /// [`should_republish`] says so.
    pub fn on_connection_state_change(
        &mut self,
        connection_id: ConnectionId,
        new_state: ConnectivityState,
    ) {
        let Some(conn) = self.connections.get_mut(&connection_id) else {
            info!(
                connection_id = %connection_id,
                state = %new_state,
                "State change for unknown connection"
            );
            return;
        };

        let old_state = conn.set_state(new_state);
        debug!(
            connection_id = %connection_id,
            from = %old_state,
            to = %new_state,
            "Connection state changed"
        );

        match TransitionEffect::on_enter(new_state) {
            TransitionEffect::Reconnect => conn.handle().connect(),
            TransitionEffect::Evict => self.evict(connection_id),
            TransitionEffect::None => {}
        }

        let old_aggregate = self.state;
        self.state = self.evaluator.record_transition(old_state, new_state);

        if should_republish(old_state, new_state, old_aggregate, self.state) {
            self.regenerate_picker();
        }
    }

    fn evict(&mut self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);

        let purged = self.affinity.purge(connection_id);
        if !purged.is_empty() {
            warn!(
                connection_id = %connection_id,
                keys = ?purged,
                "Dropped affinity keys of shut down connection"
            );
            self.publish_affinity();
        }

        debug!(
            connection_id = %connection_id,
            pool_size = self.connections.len(),
            "Connection removed from pool"
        );
    }

    /// Builds a picker from the current Ready connections and publishes it
    /// together with the aggregate state.
    pub fn regenerate_picker(&mut self) {
        let picker = if self.state.is_transient_failure() {
            Picker::Failing(PickFailure::TransientFailure)
        } else {
            let ready: Vec<ReadyConnection> = self
                .connections
                .values()
                .filter(|conn| conn.state().is_ready())
                .map(ReadyConnection::from_ref)
                .collect();

            Picker::Affinity(AffinityPicker::new(
                ready,
                Arc::clone(&self.affinity_view),
                self.events.clone(),
                self.config.max_streams,
                !self.growth_blocked
                    && self
                        .config
                        .allows_more_connections(self.connections.len()),
            ))
        };

        self.publish(Arc::new(picker));
    }

    fn publish(&self, picker: Arc<Picker>) {
        debug!(state = %self.state, picker = ?picker.kind(), "Publishing picker");

        self.current.store(Arc::new(ChannelSnapshot {
            state: self.state,
            picker: Arc::clone(&picker),
        }));
        self.controller.update_state(self.state, picker);
    }
}

// ============================================================================
// ConnectionPool - Lifecycle
// ============================================================================

impl ConnectionPool {
    /// Releases all state.
    ///
    /// Late readers of the snapshot cell see `Shutdown` and a picker that
    /// fails with [`Error::BalancerClosed`](crate::Error::BalancerClosed).
    /// Connection handles are left to the runtime.
    pub fn close(mut self) {
        info!(
            connections = self.connections.len(),
            affinity_keys = self.affinity.len(),
            "ConnectionPool closing"
        );

        self.connections.clear();
        self.affinity.clear();
        self.publish_affinity();
        self.addresses.clear();
        self.state = ConnectivityState::Shutdown;

        self.current.store(Arc::new(ChannelSnapshot {
            state: ConnectivityState::Shutdown,
            picker: Arc::new(Picker::Failing(PickFailure::Closed)),
        }));
    }
}

// ============================================================================
// Tests
// ============================================================================

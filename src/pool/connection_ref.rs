//! Per-connection bookkeeping.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashMap;

use crate::identifiers::ConnectionId;
use crate::state::ConnectivityState;
use crate::transport::SubConnection;

// ============================================================================
// Types
// ============================================================================

/// The pool's working set, keyed by the runtime's connection ID.
pub type ConnectionSet = FxHashMap<ConnectionId, ConnectionRef>;

// ============================================================================
// ConnectionRef
// ============================================================================

/// A connection handle with its last known state and usage counters.
///
/// Owned by the pool. Only the stream counter is shared: pickers bump it
/// when they hand the connection to a request.
#[derive(Debug)]
pub struct ConnectionRef {
    handle: Arc<dyn SubConnection>,
    state: ConnectivityState,
    affinity_count: u32,
    streams: Arc<AtomicU32>,
}

impl ConnectionRef {
    /// Wraps a freshly created handle: `Idle`, zero counters.
    pub(crate) fn new(handle: Arc<dyn SubConnection>) -> Self {
        Self {
            handle,
            state: ConnectivityState::Idle,
            affinity_count: 0,
            streams: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Runtime ID of the underlying connection.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// The underlying connection handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &Arc<dyn SubConnection> {
        &self.handle
    }

    /// Last state reported by the runtime.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Number of affinity keys bound to this connection.
    #[inline]
    #[must_use]
    pub fn affinity_count(&self) -> u32 {
        self.affinity_count
    }

    /// Number of requests currently using this connection.
    #[inline]
    #[must_use]
    pub fn stream_count(&self) -> u32 {
        self.streams.load(Ordering::Relaxed)
    }

    /// Stores a new state and returns the previous one.
    pub(crate) fn set_state(&mut self, state: ConnectivityState) -> ConnectivityState {
        std::mem::replace(&mut self.state, state)
    }

    pub(crate) fn increment_affinity(&mut self) {
        self.affinity_count += 1;
    }

    /// Decrements the affinity count and returns the remainder.
    pub(crate) fn decrement_affinity(&mut self) -> u32 {
        self.affinity_count = self.affinity_count.saturating_sub(1);
        self.affinity_count
    }

    pub(crate) fn streams(&self) -> &Arc<AtomicU32> {
        &self.streams
    }
}

// ============================================================================
// TransitionEffect
// ============================================================================

/// What the pool must do when a connection enters a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Nothing beyond bookkeeping.
    None,
    /// Ask the connection to connect again.
    Reconnect,
    /// Drop the connection from the working set.
    Evict,
}

impl TransitionEffect {
    /// Effect of entering `state`.
    #[must_use]
    pub fn on_enter(state: ConnectivityState) -> Self {
        match state {
            ConnectivityState::Idle => Self::Reconnect,
            ConnectivityState::Shutdown => Self::Evict,
            ConnectivityState::Connecting
            | ConnectivityState::Ready
            | ConnectivityState::TransientFailure => Self::None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

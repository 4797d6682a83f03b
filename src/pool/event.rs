//! Inbound events for the pool's event loop.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::state::ConnectivityState;
use crate::transport::Address;

use super::core::PoolStats;

// ============================================================================
// Types
// ============================================================================

/// Sender half handed to pickers.
///
/// Weak so that outstanding pickers do not keep the event loop alive once
/// every [`Balancer`](crate::Balancer) handle is gone.
pub type EventSender = mpsc::WeakUnboundedSender<PoolEvent>;

// ============================================================================
// PoolEvent
// ============================================================================

/// Every mutation of the pool, serialized through one queue.
#[derive(Debug)]
pub enum PoolEvent {
    /// New resolver output, or the resolver's error.
    ResolvedAddresses(Result<Vec<Address>>),
    /// A connection reported a state transition.
    StateChange {
        connection_id: ConnectionId,
        state: ConnectivityState,
    },
    /// Bind an affinity key.
    Bind {
        key: String,
        connection_id: ConnectionId,
    },
    /// Release one binding of an affinity key.
    Unbind { key: String },
    /// A picker found every ready connection at its stream limit.
    ScaleUp,
    /// Report pool statistics.
    Stats(oneshot::Sender<PoolStats>),
    /// Tear down the pool and stop the event loop.
    Close(oneshot::Sender<()>),
}

/// Sends `event` if the event loop is still running.
///
/// Returns `false` when it has stopped.
pub(crate) fn send_event(events: &EventSender, event: PoolEvent) -> bool {
    events
        .upgrade()
        .is_some_and(|sender| sender.send(event).is_ok())
}

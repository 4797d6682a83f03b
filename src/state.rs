//! Connectivity states and their aggregation.
//!
//! [`ConnectivityState`] is the lifecycle of one connection and also the
//! state the balancer reports for the whole channel. [`StateEvaluator`]
//! derives the channel-wide state from per-connection transitions:
//!
//! ```text
//! Ready             if any connection is Ready
//! Connecting        else if any connection is Connecting
//! TransientFailure  otherwise
//! ```
//!
//! `Idle` and `Shutdown` are never derived. The pool sets them directly
//! (before the first connection exists, and after close).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectivityState
// ============================================================================

/// Connectivity state of a connection or of the whole channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectivityState {
    /// Not connected and not trying to.
    #[default]
    Idle,
    /// Establishing a connection.
    Connecting,
    /// Connected and able to carry requests.
    Ready,
    /// Connection attempt failed; the transport will retry.
    TransientFailure,
    /// Terminal. The connection will never be used again.
    Shutdown,
}

impl ConnectivityState {
    /// Returns `true` for [`ConnectivityState::Ready`].
    #[inline]
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` for [`ConnectivityState::TransientFailure`].
    #[inline]
    #[must_use]
    pub fn is_transient_failure(self) -> bool {
        matches!(self, Self::TransientFailure)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

// ============================================================================
// StateEvaluator
// ============================================================================

/// Counts connections per tracked state and evaluates the aggregate.
///
/// Not synchronized: only the task that owns the pool may call
/// [`record_transition`](Self::record_transition).
#[derive(Debug, Default)]
pub struct StateEvaluator {
    num_ready: usize,
    num_connecting: usize,
    num_transient_failure: usize,
}

impl StateEvaluator {
    /// Creates an evaluator with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observed transition and returns the new aggregate state.
    ///
    /// Must be called exactly once per transition.
    pub fn record_transition(
        &mut self,
        old_state: ConnectivityState,
        new_state: ConnectivityState,
    ) -> ConnectivityState {
        if let Some(counter) = self.counter_mut(old_state) {
            *counter = counter.saturating_sub(1);
        }
        if let Some(counter) = self.counter_mut(new_state) {
            *counter += 1;
        }
        self.aggregate()
    }

    /// Evaluates the aggregate from the current counters.
    #[must_use]
    pub fn aggregate(&self) -> ConnectivityState {
        if self.num_ready > 0 {
            ConnectivityState::Ready
        } else if self.num_connecting > 0 {
            ConnectivityState::Connecting
        } else {
            ConnectivityState::TransientFailure
        }
    }

    /// Number of connections currently counted as Ready.
    #[inline]
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.num_ready
    }

    fn counter_mut(&mut self, state: ConnectivityState) -> Option<&mut usize> {
        match state {
            ConnectivityState::Ready => Some(&mut self.num_ready),
            ConnectivityState::Connecting => Some(&mut self.num_connecting),
            ConnectivityState::TransientFailure => Some(&mut self.num_transient_failure),
            ConnectivityState::Idle | ConnectivityState::Shutdown => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

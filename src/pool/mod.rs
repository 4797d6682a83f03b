//! Connection pool and affinity bookkeeping.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                ConnectionPool                 │
//! │                                               │
//! │  ConnectionSet   conn-1 → ConnectionRef       │
//! │                  conn-2 → ConnectionRef       │
//! │                                               │
//! │  AffinityTable   "session-a" → conn-1         │
//! │                  "session-b" → conn-2         │
//! │                                               │
//! │  StateEvaluator  ready=2 connecting=0 tf=0    │
//! └───────────────────────────────────────────────┘
//!            │ publish on readiness flip or
//!            ▼ TransientFailure boundary
//!     ChannelSnapshot { state, picker }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `affinity` | Reference-counted key bindings |
//! | `connection_ref` | Per-connection state and counters |
//! | `core` | The pool state machine |
//! | `event` | Inbound events for the event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Reference-counted key bindings.
pub mod affinity;

/// Per-connection state and counters.
pub mod connection_ref;

/// The pool state machine.
pub mod core;

/// Inbound events for the event loop.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use affinity::{AffinityTable, AffinityView, BindOutcome};
pub use connection_ref::{ConnectionRef, ConnectionSet, TransitionEffect};
pub use self::core::{ChannelSnapshot, ConnectionPool, PoolStats, should_republish};
pub use event::{EventSender, PoolEvent};

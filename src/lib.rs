//! Affinity Balancer - connection pooling with session stickiness.
//!
//! This library is the core of a load-balancing policy for an RPC channel
//! talking to interchangeable backends, some of which need session affinity:
//! once a session (an "affinity key") is bound to a connection, every request
//! carrying that key reuses it.
//!
//! # Architecture
//!
//! The balancer sits between the request dispatcher and the transport:
//!
//! - **Host runtime**: resolves addresses, owns sockets, reports connection
//!   states, and asks the current picker where to send each request
//! - **Balancer**: keeps the pool, the affinity table and the aggregate
//!   state, and publishes a new picker when routing may have changed
//!
//! Key design principles:
//!
//! - One task owns all mutable pool state; every mutation is a queued event
//! - Pickers are immutable and swapped atomically, so picks never block
//! - The balancer never does network I/O; it only requests connects
//!
//! # Quick Start
//!
//! ```ignore
//! use affinity_balancer::{Address, AffinityCommand, Balancer, PickInfo, Result};
//!
//! async fn example(controller: std::sync::Arc<MyRuntime>) -> Result<()> {
//!     let balancer = Balancer::builder().build(controller)?;
//!     balancer.on_resolved_addresses(Ok(vec![Address::new("10.0.0.1:443")]))?;
//!
//!     // ... runtime reports connection states ...
//!
//!     let pick = balancer.pick(&PickInfo::new("sessions/1", AffinityCommand::Bound))?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`balancer`] | [`Balancer`] handle, builder, configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`picker`] | Routing snapshots |
//! | [`pool`] | Connection pool state machine and affinity table |
//! | [`state`] | Connectivity states and aggregation |
//! | [`transport`] | Boundary with the host runtime |

// ============================================================================
// Modules
// ============================================================================

/// Balancer handle, builder and configuration.
///
/// Use [`Balancer::builder()`] to start a balancer.
pub mod balancer;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Routing snapshots published to the runtime.
pub mod picker;

/// Connection pool state machine.
///
/// Normally driven by [`Balancer`]; usable directly for embedding in an
/// existing executor.
pub mod pool;

/// Connectivity states and aggregation.
pub mod state;

/// Boundary with the host runtime.
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// ============================================================================
// Constants
// ============================================================================

/// Name under which this policy registers with the host runtime.
pub const POLICY_NAME: &str = "affinity_pool";

// ============================================================================
// Re-exports
// ============================================================================

// Balancer types
pub use balancer::{Balancer, BalancerBuilder, BalancerConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Picker types
pub use picker::{
    AffinityCommand, DoneCallback, DoneInfo, PickFailure, PickInfo, PickResult, Picker, PickerKind,
};

// Pool types
pub use pool::{ChannelSnapshot, ConnectionPool, PoolEvent, PoolStats};

// State types
pub use state::{ConnectivityState, StateEvaluator};

// Transport types
pub use transport::{Address, ChannelController, NewConnectionOptions, SubConnection};

//! The balancer: configuration, construction, and the running handle.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Balancer`] | Handle to the running event loop |
//! | [`BalancerBuilder`] | Fluent construction |
//! | [`BalancerConfig`] | Health checking and pool limits |
//!
//! # Example
//!
//! ```ignore
//! use affinity_balancer::{Address, Balancer, ConnectivityState};
//!
//! let balancer = Balancer::builder().build(controller)?;
//! balancer.on_resolved_addresses(Ok(vec![Address::new("10.0.0.1:443")]))?;
//!
//! // Later, from the runtime's connection watcher:
//! balancer.on_connection_state_change(id, ConnectivityState::Ready)?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for balancer construction.
pub mod builder;

/// Balancer configuration.
pub mod config;

/// The balancer handle and event loop.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Balancer;
pub use builder::BalancerBuilder;
pub use config::{BalancerConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_STREAMS};

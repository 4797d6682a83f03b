//! Builder pattern for balancer construction.
//!
//! # Example
//!
//! ```ignore
//! use affinity_balancer::Balancer;
//!
//! let balancer = Balancer::builder()
//!     .health_check(true)
//!     .max_streams(50)
//!     .build(controller)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::ChannelController;

use super::config::BalancerConfig;
use super::core::Balancer;

// ============================================================================
// BalancerBuilder
// ============================================================================

/// Builder for a [`Balancer`].
///
/// Use [`Balancer::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct BalancerBuilder {
    config: BalancerConfig,
}

// ============================================================================
// BalancerBuilder Implementation
// ============================================================================

impl BalancerBuilder {
    /// Creates a builder with the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: BalancerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables or disables health checking on created connections.
    #[inline]
    #[must_use]
    pub fn health_check(mut self, enabled: bool) -> Self {
        self.config.health_check = enabled;
        self
    }

    /// Sets the pool size limit (`0` for unlimited).
    #[inline]
    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    /// Sets the per-connection stream limit.
    #[inline]
    #[must_use]
    pub fn max_streams(mut self, max_streams: u32) -> Self {
        self.config.max_streams = max_streams;
        self
    }

    /// Validates the configuration and starts the balancer's event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Config`] if called outside a tokio runtime
    pub fn build(self, controller: Arc<dyn ChannelController>) -> Result<Balancer> {
        self.config.validate()?;

        let runtime = Handle::try_current().map_err(|_| {
            Error::config("Balancer must be built from within a tokio runtime")
        })?;

        Ok(Balancer::spawn(&runtime, controller, self.config))
    }
}

// ============================================================================
// Tests
// ============================================================================

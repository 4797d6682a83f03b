//! Balancer configuration.
//!
//! Parsed from the load-balancing section of a service config:
//!
//! ```json
//! { "healthCheck": true, "maxConnections": 10, "maxStreams": 100 }
//! ```
//!
//! Every field is optional.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::transport::NewConnectionOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound on pool size.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default soft limit on concurrent streams per connection.
pub const DEFAULT_MAX_STREAMS: u32 = 100;

// ============================================================================
// BalancerConfig
// ============================================================================

/// Balancer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct BalancerConfig {
    /// Enable health checking on created connections.
    pub health_check: bool,

    /// Upper bound on pool size. `0` means unlimited.
    pub max_connections: usize,

    /// Streams per connection before the pool tries to grow.
    pub max_streams: u32,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            health_check: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_streams: DEFAULT_MAX_STREAMS,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BalancerConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is malformed or has unknown fields
    /// - [`Error::Config`] if a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BalancerConfig {
    /// Enables or disables health checking.
    #[inline]
    #[must_use]
    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Sets the pool size limit (`0` for unlimited).
    #[inline]
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Sets the per-connection stream limit.
    #[inline]
    #[must_use]
    pub fn with_max_streams(mut self, max_streams: u32) -> Self {
        self.max_streams = max_streams;
        self
    }
}

// ============================================================================
// Queries
// ============================================================================

impl BalancerConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `max_streams` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_streams == 0 {
            return Err(Error::config("maxStreams must be greater than 0"));
        }
        Ok(())
    }

    /// Options for new connections.
    #[inline]
    #[must_use]
    pub fn connection_options(&self) -> NewConnectionOptions {
        NewConnectionOptions {
            health_check_enabled: self.health_check,
        }
    }

    /// Whether a pool of `pool_size` may add another connection.
    #[inline]
    #[must_use]
    pub fn allows_more_connections(&self, pool_size: usize) -> bool {
        self.max_connections == 0 || pool_size < self.max_connections
    }
}

// ============================================================================
// Tests
// ============================================================================

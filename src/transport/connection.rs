//! Backend addresses and connection handles.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::identifiers::ConnectionId;

// ============================================================================
// Address
// ============================================================================

/// One resolved backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Network address, e.g. `10.0.0.1:443`.
    pub addr: String,
    /// Authority override for TLS, if the resolver supplied one.
    pub server_name: Option<String>,
}

impl Address {
    /// Creates an address without a server name.
    #[inline]
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            server_name: None,
        }
    }

    /// Sets the server name.
    #[inline]
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server_name {
            Some(name) => write!(f, "{} ({})", self.addr, name),
            None => f.write_str(&self.addr),
        }
    }
}

// ============================================================================
// NewConnectionOptions
// ============================================================================

/// Options passed to [`ChannelController::new_connection`].
///
/// [`ChannelController::new_connection`]: super::ChannelController::new_connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewConnectionOptions {
    /// Whether the runtime should run health checks on the connection.
    pub health_check_enabled: bool,
}

impl Default for NewConnectionOptions {
    fn default() -> Self {
        Self {
            health_check_enabled: true,
        }
    }
}

// ============================================================================
// SubConnection
// ============================================================================

/// Handle to one backend connection managed by the runtime.
///
/// The pool holds it by reference only. Socket teardown belongs to the
/// runtime; both calls below are fire-and-forget and the outcome comes back
/// as a state change notification.
pub trait SubConnection: Send + Sync + fmt::Debug {
    /// Identity used by the runtime when reporting state changes.
    fn id(&self) -> ConnectionId;

    /// Replaces the set of addresses this connection may dial.
    fn update_addresses(&self, addresses: &[Address]);

    /// Starts connecting if the connection is not already connected.
    fn connect(&self);
}

// ============================================================================
// Tests
// ============================================================================

//! Error types for the affinity balancer.
//!
//! Only the pick errors ([`Error::NoSubchannelAvailable`],
//! [`Error::TransientFailure`], [`Error::BalancerClosed`]) ever reach request
//! callers. Everything else is logged and absorbed by the pool, which always
//! degrades to a well-defined aggregate state.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Runtime input | [`Error::Resolution`], [`Error::ConnectionCreation`], [`Error::UnknownConnection`] |
//! | Routing | [`Error::NoSubchannelAvailable`], [`Error::TransientFailure`] |
//! | Lifecycle | [`Error::BalancerClosed`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when balancer configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Runtime Input Errors
    // ========================================================================
    /// Address resolution failed.
    ///
    /// Delivered by the host runtime in place of an address list.
    #[error("Resolution failed: {message}")]
    Resolution {
        /// Description of the resolver failure.
        message: String,
    },

    /// The runtime could not create a connection.
    #[error("Connection creation failed: {message}")]
    ConnectionCreation {
        /// Description of the creation failure.
        message: String,
    },

    /// Notification for a connection the pool does not track.
    #[error("Unknown connection: {connection_id}")]
    UnknownConnection {
        /// The untracked connection.
        connection_id: ConnectionId,
    },

    // ========================================================================
    // Routing Errors
    // ========================================================================
    /// No ready connection yet.
    ///
    /// The pool is still converging; the caller should wait for the next
    /// picker.
    #[error("No subchannel available")]
    NoSubchannelAvailable,

    /// All connections are failing.
    ///
    /// Returned by the picker published while the aggregate state is
    /// `TransientFailure`.
    #[error("Transient failure: no backend available")]
    TransientFailure,

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The balancer has been closed.
    #[error("Balancer closed")]
    BalancerClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a resolution error.
    #[inline]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Creates a connection creation error.
    #[inline]
    pub fn connection_creation(message: impl Into<String>) -> Self {
        Self::ConnectionCreation {
            message: message.into(),
        }
    }

    /// Creates an unknown connection error.
    #[inline]
    pub fn unknown_connection(connection_id: ConnectionId) -> Self {
        Self::UnknownConnection { connection_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error is returned from a pick.
    #[inline]
    #[must_use]
    pub fn is_pick_error(&self) -> bool {
        matches!(
            self,
            Self::NoSubchannelAvailable | Self::TransientFailure | Self::BalancerClosed
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed once the pool publishes a new picker.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoSubchannelAvailable
                | Self::TransientFailure
                | Self::Resolution { .. }
                | Self::ConnectionCreation { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

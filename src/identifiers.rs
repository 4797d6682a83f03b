//! Type-safe identifiers.
//!
//! The host runtime tags every connection handle it creates with a
//! [`ConnectionId`]; the pool keys its working set by it and the runtime uses
//! it when reporting state changes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Globals
// ============================================================================

/// Source for [`ConnectionId::next`].
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifier of one backend connection.
///
/// Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    /// Creates an ID from a raw value.
    ///
    /// Returns `None` for zero.
    #[inline]
    #[must_use]
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Allocates a fresh, process-unique ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        let value = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 allocations to wrap.
        Self(NonZeroU64::new(value).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Channel-level callbacks into the runtime.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Result;
use crate::picker::Picker;
use crate::state::ConnectivityState;

use super::connection::{Address, NewConnectionOptions, SubConnection};

// ============================================================================
// ChannelController
// ============================================================================

/// The channel the balancer is attached to.
///
/// Called only from the balancer's event loop, never concurrently.
pub trait ChannelController: Send + Sync {
    /// Creates a connection for `addresses`.
    ///
    /// The returned handle starts in `Idle`; the pool calls
    /// [`SubConnection::connect`] on it right away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionCreation`](crate::Error::ConnectionCreation)
    /// when the runtime cannot create the connection.
    fn new_connection(
        &self,
        addresses: &[Address],
        options: NewConnectionOptions,
    ) -> Result<Arc<dyn SubConnection>>;

    /// Publishes the aggregate state and the picker to use for new requests.
    fn update_state(&self, state: ConnectivityState, picker: Arc<Picker>);
}

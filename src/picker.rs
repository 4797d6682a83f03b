//! Routing snapshots.
//!
//! A [`Picker`] is built by the pool from the connections that are Ready at
//! that moment and is never mutated afterwards. The pool replaces it wholesale
//! when routing may have changed.
//!
//! # Selection
//!
//! [`AffinityPicker`] routes in this order:
//!
//! 1. A request carrying a bound affinity key goes to its bound connection,
//!    or fails with [`Error::NoSubchannelAvailable`] until that connection is
//!    Ready again.
//! 2. Otherwise the Ready connection with the fewest open streams, if it is
//!    below the per-connection stream limit.
//! 3. If every connection is at the limit and the pool may grow, the pool is
//!    asked for one more connection and the pick fails with
//!    [`Error::NoSubchannelAvailable`]; at full size the least busy
//!    connection is used anyway.
//!
//! # Example
//!
//! ```ignore
//! let info = PickInfo::new("projects/p/sessions/s1", AffinityCommand::Bound);
//! let result = balancer.picker().pick(&info)?;
//! send_rpc(result.connection()).await;
//! result.complete(DoneInfo::default());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use arc_swap::ArcSwap;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::pool::{AffinityView, ConnectionRef, EventSender, PoolEvent};
use crate::pool::event::send_event;
use crate::transport::SubConnection;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked once the request finishes.
pub type DoneCallback = Box<dyn FnOnce(DoneInfo) + Send>;

// ============================================================================
// AffinityCommand
// ============================================================================

/// What a request does with its affinity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AffinityCommand {
    /// No affinity.
    #[default]
    None,
    /// Bind the key to the chosen connection once the request succeeds.
    Bind,
    /// Route to the connection the key is bound to.
    Bound,
    /// Route to the bound connection, then release the binding on success.
    Unbind,
}

// ============================================================================
// PickInfo
// ============================================================================

/// Per-request routing input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickInfo {
    /// Session key carried by the request.
    pub affinity_key: Option<String>,
    /// How the key is used.
    pub command: AffinityCommand,
}

impl PickInfo {
    /// Creates routing input for a keyed request.
    #[inline]
    #[must_use]
    pub fn new(affinity_key: impl Into<String>, command: AffinityCommand) -> Self {
        Self {
            affinity_key: Some(affinity_key.into()),
            command,
        }
    }

    /// Key to look up in the affinity table, if this request routes by one.
    fn bound_key(&self) -> Option<&str> {
        match self.command {
            AffinityCommand::Bound | AffinityCommand::Unbind => self.affinity_key.as_deref(),
            AffinityCommand::None | AffinityCommand::Bind => None,
        }
    }
}

// ============================================================================
// DoneInfo
// ============================================================================

/// Outcome reported when a picked request finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoneInfo {
    /// Error message if the request failed.
    pub error: Option<String>,
    /// Key to bind, when it only becomes known from the response.
    ///
    /// Takes precedence over [`PickInfo::affinity_key`] for
    /// [`AffinityCommand::Bind`].
    pub affinity_key: Option<String>,
}

impl DoneInfo {
    /// A failed request.
    #[inline]
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            affinity_key: None,
        }
    }

    /// A successful request whose response named the key to bind.
    #[inline]
    #[must_use]
    pub fn bind_key(affinity_key: impl Into<String>) -> Self {
        Self {
            error: None,
            affinity_key: Some(affinity_key.into()),
        }
    }
}

// ============================================================================
// PickResult
// ============================================================================

/// A chosen connection plus the callback that releases it.
///
/// Dropping it without [`complete`](Self::complete) releases the stream as a
/// failed request.
pub struct PickResult {
    connection_id: ConnectionId,
    connection: Arc<dyn SubConnection>,
    done: Option<DoneCallback>,
}

impl PickResult {
    /// ID of the chosen connection.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The chosen connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn SubConnection> {
        &self.connection
    }

    /// Reports the request outcome.
    ///
    /// Must be called exactly once per successful pick.
    pub fn complete(mut self, info: DoneInfo) {
        if let Some(done) = self.done.take() {
            done(info);
        }
    }

    /// Splits into the connection and the completion callback.
    ///
    /// The caller becomes responsible for invoking the callback.
    #[must_use]
    pub fn into_parts(mut self) -> (Arc<dyn SubConnection>, DoneCallback) {
        let done: DoneCallback = match self.done.take() {
            Some(done) => done,
            None => Box::new(|_: DoneInfo| {}),
        };
        (Arc::clone(&self.connection), done)
    }
}

impl Drop for PickResult {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            trace!(connection_id = %self.connection_id, "Pick dropped without completion");
            done(DoneInfo::failed("dropped without completion"));
        }
    }
}

impl fmt::Debug for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickResult")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Picker
// ============================================================================

/// Why a [`Picker::Failing`] rejects every pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickFailure {
    /// Still converging.
    NoSubchannelAvailable,
    /// Aggregate state is TransientFailure.
    TransientFailure,
    /// The balancer was closed.
    Closed,
}

impl PickFailure {
    fn to_error(self) -> Error {
        match self {
            Self::NoSubchannelAvailable => Error::NoSubchannelAvailable,
            Self::TransientFailure => Error::TransientFailure,
            Self::Closed => Error::BalancerClosed,
        }
    }
}

/// Shape of a picker, for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerKind {
    /// Always fails with no subchannel available.
    NoSubchannelAvailable,
    /// Always fails with transient failure.
    TransientFailure,
    /// Always fails because the balancer is closed.
    Closed,
    /// Routes over ready connections.
    Affinity,
}

/// Immutable routing snapshot.
#[derive(Debug)]
pub enum Picker {
    /// Fails every pick.
    Failing(PickFailure),
    /// Routes over the connections that were Ready when it was built.
    Affinity(AffinityPicker),
}

impl Picker {
    /// Chooses a connection for one request.
    ///
    /// # Errors
    ///
    /// - [`Error::NoSubchannelAvailable`] while no suitable connection is Ready
    /// - [`Error::TransientFailure`] if every connection is failing
    /// - [`Error::BalancerClosed`] after close
    pub fn pick(&self, info: &PickInfo) -> Result<PickResult> {
        match self {
            Self::Failing(failure) => Err(failure.to_error()),
            Self::Affinity(picker) => picker.pick(info),
        }
    }

    /// IDs of the connections this picker routes over, sorted.
    #[must_use]
    pub fn ready_connections(&self) -> Vec<ConnectionId> {
        match self {
            Self::Failing(_) => Vec::new(),
            Self::Affinity(picker) => {
                let mut ids: Vec<_> = picker.ready.iter().map(|conn| conn.id).collect();
                ids.sort_unstable();
                ids
            }
        }
    }

    /// Shape of this picker.
    #[must_use]
    pub fn kind(&self) -> PickerKind {
        match self {
            Self::Failing(PickFailure::NoSubchannelAvailable) => PickerKind::NoSubchannelAvailable,
            Self::Failing(PickFailure::TransientFailure) => PickerKind::TransientFailure,
            Self::Failing(PickFailure::Closed) => PickerKind::Closed,
            Self::Affinity(_) => PickerKind::Affinity,
        }
    }
}

// ============================================================================
// ReadyConnection
// ============================================================================

/// A Ready connection as captured in a picker.
#[derive(Debug, Clone)]
pub struct ReadyConnection {
    id: ConnectionId,
    handle: Arc<dyn SubConnection>,
    streams: Arc<AtomicU32>,
}

impl ReadyConnection {
    pub(crate) fn from_ref(conn: &ConnectionRef) -> Self {
        Self {
            id: conn.id(),
            handle: Arc::clone(conn.handle()),
            streams: Arc::clone(conn.streams()),
        }
    }

    fn stream_count(&self) -> u32 {
        self.streams.load(Ordering::Relaxed)
    }
}

// ============================================================================
// AffinityPicker
// ============================================================================

/// Sticky, least-busy picker over a fixed set of Ready connections.
pub struct AffinityPicker {
    ready: Vec<ReadyConnection>,
    affinity: Arc<ArcSwap<AffinityView>>,
    events: EventSender,
    max_streams: u32,
    can_grow: bool,
    grow_requested: AtomicBool,
}

impl AffinityPicker {
    /// Creates a picker.
    ///
    /// `affinity` is the pool's live binding view; `can_grow` says whether
    /// the pool was below its connection limit when this picker was built.
    pub(crate) fn new(
        ready: Vec<ReadyConnection>,
        affinity: Arc<ArcSwap<AffinityView>>,
        events: EventSender,
        max_streams: u32,
        can_grow: bool,
    ) -> Self {
        Self {
            ready,
            affinity,
            events,
            max_streams,
            can_grow,
            grow_requested: AtomicBool::new(false),
        }
    }

    fn pick(&self, info: &PickInfo) -> Result<PickResult> {
        if self.ready.is_empty() {
            return Err(Error::NoSubchannelAvailable);
        }

        let chosen = match self.bound_connection(info)? {
            Some(conn) => conn,
            None => self.least_busy()?,
        };

        chosen.streams.fetch_add(1, Ordering::Relaxed);
        trace!(connection_id = %chosen.id, "Picked connection");

        Ok(PickResult {
            connection_id: chosen.id,
            connection: Arc::clone(&chosen.handle),
            done: Some(self.done_callback(chosen, info)),
        })
    }

    /// Connection bound to the request's key, if it routes by one.
    fn bound_connection(&self, info: &PickInfo) -> Result<Option<&ReadyConnection>> {
        let Some(key) = info.bound_key() else {
            return Ok(None);
        };
        let Some(bound_id) = self.affinity.load().get(key).copied() else {
            return Ok(None);
        };

        match self.ready.iter().find(|conn| conn.id == bound_id) {
            Some(conn) => Ok(Some(conn)),
            None => {
                debug!(key, connection_id = %bound_id, "Bound connection not ready");
                Err(Error::NoSubchannelAvailable)
            }
        }
    }

    fn least_busy(&self) -> Result<&ReadyConnection> {
        let conn = self
            .ready
            .iter()
            .min_by_key(|conn| conn.stream_count())
            .ok_or(Error::NoSubchannelAvailable)?;

        if conn.stream_count() < self.max_streams || !self.can_grow {
            return Ok(conn);
        }

        if !self.grow_requested.swap(true, Ordering::AcqRel) {
            debug!(
                max_streams = self.max_streams,
                "All ready connections saturated, requesting another"
            );
            send_event(&self.events, PoolEvent::ScaleUp);
        }
        Err(Error::NoSubchannelAvailable)
    }

    fn done_callback(&self, chosen: &ReadyConnection, info: &PickInfo) -> DoneCallback {
        let connection_id = chosen.id;
        let streams = Arc::clone(&chosen.streams);
        let events = self.events.clone();
        let command = info.command;
        let key = info.affinity_key.clone();

        Box::new(move |done: DoneInfo| {
            if done.error.is_none() {
                match command {
                    AffinityCommand::Bind => {
                        if let Some(key) = done.affinity_key.or(key) {
                            send_event(&events, PoolEvent::Bind { key, connection_id });
                        }
                    }
                    AffinityCommand::Unbind => {
                        if let Some(key) = key {
                            send_event(&events, PoolEvent::Unbind { key });
                        }
                    }
                    AffinityCommand::None | AffinityCommand::Bound => {}
                }
            }

            let _ = streams.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            });
        })
    }
}

impl fmt::Debug for AffinityPicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityPicker")
            .field("ready", &self.ready.iter().map(|c| c.id).collect::<Vec<_>>())
            .field("max_streams", &self.max_streams)
            .field("can_grow", &self.can_grow)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

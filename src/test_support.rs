//! Recording fakes of the runtime side, shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::picker::Picker;
use crate::state::ConnectivityState;
use crate::transport::{Address, ChannelController, NewConnectionOptions, SubConnection};

// ============================================================================
// FakeConnection
// ============================================================================

#[derive(Debug)]
pub(crate) struct FakeConnection {
    id: ConnectionId,
    connect_calls: AtomicUsize,
    addresses: Mutex<Vec<Address>>,
}

impl FakeConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            connect_calls: AtomicUsize::new(0),
            addresses: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_addresses(&self) -> Vec<Address> {
        self.addresses.lock().clone()
    }
}

impl SubConnection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn update_addresses(&self, addresses: &[Address]) {
        *self.addresses.lock() = addresses.to_vec();
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// FakeController
// ============================================================================

#[derive(Default)]
pub(crate) struct FakeController {
    created: Mutex<Vec<Arc<FakeConnection>>>,
    new_connection_calls: AtomicUsize,
    last_request: Mutex<Option<(Vec<Address>, NewConnectionOptions)>>,
    fail_next: AtomicBool,
    updates: Mutex<Vec<(ConnectivityState, Arc<Picker>)>>,
}

impl FakeController {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_next_connection(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn created(&self) -> Vec<Arc<FakeConnection>> {
        self.created.lock().clone()
    }

    pub(crate) fn created_ids(&self) -> Vec<ConnectionId> {
        self.created.lock().iter().map(|conn| conn.id()).collect()
    }

    pub(crate) fn new_connection_calls(&self) -> usize {
        self.new_connection_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_new_connection_addresses(&self) -> Vec<Address> {
        self.last_request
            .lock()
            .as_ref()
            .map(|(addresses, _)| addresses.clone())
            .unwrap_or_default()
    }

    pub(crate) fn last_new_connection_options(&self) -> Option<NewConnectionOptions> {
        self.last_request.lock().as_ref().map(|(_, options)| *options)
    }

    pub(crate) fn update_state_calls(&self) -> usize {
        self.updates.lock().len()
    }

    pub(crate) fn last_update(&self) -> Option<(ConnectivityState, Arc<Picker>)> {
        self.updates.lock().last().cloned()
    }
}

impl ChannelController for FakeController {
    fn new_connection(
        &self,
        addresses: &[Address],
        options: NewConnectionOptions,
    ) -> Result<Arc<dyn SubConnection>> {
        self.new_connection_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some((addresses.to_vec(), options));

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::connection_creation("injected failure"));
        }

        let conn = FakeConnection::new();
        self.created.lock().push(Arc::clone(&conn));
        Ok(conn)
    }

    fn update_state(&self, state: ConnectivityState, picker: Arc<Picker>) {
        self.updates.lock().push((state, picker));
    }
}

//! Affinity key to connection bindings.
//!
//! Every bind increments the bound connection's affinity count, including a
//! bind of a key that is already present. Callers pair each bind with exactly
//! one unbind. The count belongs to the connection, so when it reaches zero
//! every key bound to that connection is dropped.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::connection_ref::ConnectionSet;

// ============================================================================
// Types
// ============================================================================

/// Immutable copy of the bindings, published for pickers.
pub type AffinityView = FxHashMap<String, ConnectionId>;

/// Result of a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The key was new and now maps to the requested connection.
    Inserted,
    /// The key was already bound; its connection's count went up by one.
    Incremented(ConnectionId),
}

// ============================================================================
// AffinityTable
// ============================================================================

/// Reference-counted map from affinity key to connection.
#[derive(Debug, Default)]
pub struct AffinityTable {
    entries: FxHashMap<String, ConnectionId>,
}

impl AffinityTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is bound.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Connection bound to `key`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ConnectionId> {
        self.entries.get(key).copied()
    }

    /// Binds `key` to `connection_id`.
    ///
    /// An already-bound key keeps its connection and that connection's count
    /// is incremented again, whatever `connection_id` says.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownConnection`] if the key is new and `connection_id` is
    /// not in `connections`.
    pub fn bind(
        &mut self,
        key: &str,
        connection_id: ConnectionId,
        connections: &mut ConnectionSet,
    ) -> Result<BindOutcome> {
        if let Some(&bound_id) = self.entries.get(key) {
            if let Some(bound) = connections.get_mut(&bound_id) {
                if bound_id != connection_id {
                    debug!(
                        key,
                        bound = %bound_id,
                        requested = %connection_id,
                        "Key already bound, keeping existing connection"
                    );
                }
                bound.increment_affinity();
                return Ok(BindOutcome::Incremented(bound_id));
            }

            // Evicted connections purge their keys, so this is a leftover.
            warn!(key, bound = %bound_id, "Dropping binding to untracked connection");
            self.entries.remove(key);
        }

        let conn = connections
            .get_mut(&connection_id)
            .ok_or_else(|| Error::unknown_connection(connection_id))?;
        conn.increment_affinity();
        self.entries.insert(key.to_owned(), connection_id);

        Ok(BindOutcome::Inserted)
    }

    /// Releases one binding of `key`.
    ///
    /// Returns `true` if any key was removed from the table. When the bound
    /// connection's count reaches zero, all of its keys go, not just `key`.
    pub fn unbind(&mut self, key: &str, connections: &mut ConnectionSet) -> bool {
        let Some(&bound_id) = self.entries.get(key) else {
            debug!(key, "Unbind for unbound key");
            return false;
        };

        let remaining = connections
            .get_mut(&bound_id)
            .map_or(0, |conn| conn.decrement_affinity());

        if remaining > 0 {
            return false;
        }

        let released = self.purge(bound_id);
        if released.len() > 1 {
            debug!(
                connection_id = %bound_id,
                keys = ?released,
                "Affinity count reached zero, released all keys"
            );
        }
        true
    }

    /// Removes every key bound to `connection_id` and returns them.
    pub fn purge(&mut self, connection_id: ConnectionId) -> Vec<String> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, id)| **id == connection_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.entries.remove(key);
        }

        keys
    }

    /// Copies the current bindings into a publishable view.
    #[must_use]
    pub fn view(&self) -> Arc<AffinityView> {
        Arc::new(self.entries.clone())
    }

    /// Drops all bindings.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pool::connection_ref::ConnectionRef;
    use crate::test_support::FakeConnection;
    use crate::transport::SubConnection;

    fn set_with(count: usize) -> (ConnectionSet, Vec<ConnectionId>) {
        let mut set = ConnectionSet::default();
        let mut ids = Vec::new();
        for _ in 0..count {
            let conn = FakeConnection::new();
            ids.push(conn.id());
            set.insert(conn.id(), ConnectionRef::new(conn));
        }
        (set, ids)
    }

    #[test]
    fn test_bind_then_unbind_restores_count() {
        let (mut set, ids) = set_with(1);
        let mut table = AffinityTable::new();

        let before = set[&ids[0]].affinity_count();
        assert_eq!(
            table.bind("session-a", ids[0], &mut set).unwrap(),
            BindOutcome::Inserted
        );
        assert_eq!(table.get("session-a"), Some(ids[0]));

        assert!(table.unbind("session-a", &mut set));
        assert_eq!(table.get("session-a"), None);
        assert_eq!(set[&ids[0]].affinity_count(), before);
    }

    #[test]
    fn test_rebind_same_key_increments_again() {
        // Binding an already-bound key is not a no-op: each bind needs its
        // own unbind.
        let (mut set, ids) = set_with(1);
        let mut table = AffinityTable::new();

        table.bind("session-a", ids[0], &mut set).unwrap();
        assert_eq!(
            table.bind("session-a", ids[0], &mut set).unwrap(),
            BindOutcome::Incremented(ids[0])
        );
        assert_eq!(set[&ids[0]].affinity_count(), 2);

        assert!(!table.unbind("session-a", &mut set));
        assert_eq!(table.get("session-a"), Some(ids[0]));
        assert_eq!(set[&ids[0]].affinity_count(), 1);
    }

    #[test]
    fn test_rebind_to_other_connection_keeps_original() {
        let (mut set, ids) = set_with(2);
        let mut table = AffinityTable::new();

        table.bind("session-a", ids[0], &mut set).unwrap();
        table.bind("session-a", ids[1], &mut set).unwrap();

        assert_eq!(table.get("session-a"), Some(ids[0]));
        assert_eq!(set[&ids[0]].affinity_count(), 2);
        assert_eq!(set[&ids[1]].affinity_count(), 0);
    }

    #[test]
    fn test_count_is_shared_across_keys() {
        let (mut set, ids) = set_with(1);
        let mut table = AffinityTable::new();

        table.bind("a", ids[0], &mut set).unwrap();
        table.bind("b", ids[0], &mut set).unwrap();
        assert_eq!(set[&ids[0]].affinity_count(), 2);

        // "a" stays while the connection still counts a binding.
        assert!(!table.unbind("a", &mut set));
        assert_eq!(table.get("a"), Some(ids[0]));

        // At zero no key may still point at the connection.
        assert!(table.unbind("b", &mut set));
        assert_eq!(set[&ids[0]].affinity_count(), 0);
        assert!(table.is_empty());
        assert!(table.view().is_empty());
    }

    #[test]
    fn test_zero_count_keeps_other_connections_keys() {
        let (mut set, ids) = set_with(2);
        let mut table = AffinityTable::new();

        table.bind("a", ids[0], &mut set).unwrap();
        table.bind("b", ids[0], &mut set).unwrap();
        table.bind("c", ids[1], &mut set).unwrap();

        table.unbind("b", &mut set);
        table.unbind("a", &mut set);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("c"), Some(ids[1]));
        for key in ["a", "b"] {
            assert_eq!(table.get(key), None);
        }
    }

    #[test]
    fn test_bind_unknown_connection_fails() {
        let (mut set, _) = set_with(0);
        let mut table = AffinityTable::new();
        let stray = ConnectionId::next();

        let err = table.bind("a", stray, &mut set).unwrap_err();
        assert!(matches!(err, Error::UnknownConnection { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_unbind_unknown_key_is_noop() {
        let (mut set, _) = set_with(1);
        let mut table = AffinityTable::new();
        assert!(!table.unbind("missing", &mut set));
    }

    #[test]
    fn test_purge_removes_only_matching_keys() {
        let (mut set, ids) = set_with(2);
        let mut table = AffinityTable::new();

        table.bind("a", ids[0], &mut set).unwrap();
        table.bind("b", ids[0], &mut set).unwrap();
        table.bind("c", ids[1], &mut set).unwrap();

        let mut purged = table.purge(ids[0]);
        purged.sort();
        assert_eq!(purged, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.view().get("c"), Some(&ids[1]));
    }
}

//! In-memory presence tracking: which users currently hold a live connection.
//!
//! Single-instance by design — presence is scoped to the server process and
//! never persisted. The directory is owned by the server lifecycle and
//! injected into the relay engine at construction.

use dashmap::DashMap;

use crate::ws::ConnectionId;

/// Maps a user id to its single active connection id.
///
/// Invariant: at most one live connection per user. A second join for the
/// same user overwrites the previous entry (last join wins); there is no
/// multi-device fan-out.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    entries: DashMap<String, ConnectionId>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user as online on the given connection, unconditionally
    /// replacing any prior entry for that user.
    pub fn set_online(&self, user_id: &str, connection_id: ConnectionId) {
        self.entries.insert(user_id.to_string(), connection_id);
    }

    /// Resolve a user's active connection. Absence means the user is
    /// offline and nothing should be delivered to them.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.entries.get(user_id).map(|entry| *entry.value())
    }

    /// Remove the entry owned by a connection, returning the user id that
    /// went offline. Returns `None` if no entry maps to this connection
    /// (the directory is left unchanged).
    pub fn remove_by_connection(&self, connection_id: ConnectionId) -> Option<String> {
        let user_id = self
            .entries
            .iter()
            .find(|entry| *entry.value() == connection_id)
            .map(|entry| entry.key().clone())?;
        // Removal is conditional on the value: a rejoin can overwrite the
        // entry between the scan and here, and a superseded entry must
        // never be evicted (last join wins).
        self.entries
            .remove_if(&user_id, |_, conn| *conn == connection_id)
            .map(|(removed, _)| removed)
    }

    /// Snapshot of all currently online user ids.
    pub fn online_users(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

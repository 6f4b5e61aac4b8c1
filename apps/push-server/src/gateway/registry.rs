//! Session store: verified user id → live connections authenticated as them.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::session::Subscriber;

/// Shared registry of authenticated connections, keyed by user id.
///
/// Uses `DashMap` for shard-level concurrency. Sets are never left empty, and
/// readers only ever get snapshots, so a connection dropping out mid fan-out
/// cannot disturb an iteration in progress.
#[derive(Default)]
pub struct SessionStore {
    users: DashMap<String, Vec<Arc<Subscriber>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to its user's set. Returns `false` if it was already
    /// registered.
    pub fn register(&self, subscriber: Arc<Subscriber>) -> bool {
        let mut set = self.users.entry(subscriber.user_id.clone()).or_default();
        if set
            .iter()
            .any(|s| s.connection_id() == subscriber.connection_id())
        {
            return false;
        }
        set.push(subscriber);
        true
    }

    /// Remove a connection from a user's set, dropping the set once empty.
    /// Returns `false` if nothing was removed.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        let Entry::Occupied(mut entry) = self.users.entry(user_id.to_string()) else {
            return false;
        };
        let before = entry.get().len();
        entry.get_mut().retain(|s| s.connection_id() != connection_id);
        let removed = entry.get().len() != before;
        if entry.get().is_empty() {
            entry.remove();
        }
        removed
    }

    /// Snapshot of the connections currently registered for `user_id`.
    pub fn recipients_for(&self, user_id: &str) -> Vec<Arc<Subscriber>> {
        self.users
            .get(user_id)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }

    /// Number of users with at least one connection.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Total number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.users.iter().map(|set| set.value().len()).sum()
    }
}

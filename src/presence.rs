//! Presence registry: the in-memory source of truth for "who is online".
//!
//! Maps each user id to the set of that user's live connection ids; a user is
//! online iff the set is non-empty. State is never persisted here — after a
//! process restart every user is implicitly offline until they reconnect.
//! That single-process, in-memory limitation is a deliberate boundary: a
//! multi-process deployment would need a shared broker behind this interface.
//!
//! Mutations for one user happen under that key's DashMap shard lock, so the
//! emptiness check and the set update are a single atomic step: two devices
//! registering in quick succession produce exactly one online transition and
//! no spurious offline in between, and operations on different users never
//! block each other.

use dashmap::DashMap;
use std::collections::HashSet;

/// Result of a register/unregister call, telling the lifecycle controller
/// whether a user-visible presence transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// First connection for the user: they just came online.
    CameOnline,
    /// Last connection closed: they just went offline.
    WentOffline,
    /// Another device was already (or is still) connected.
    Unchanged,
}

#[derive(Default)]
pub struct PresenceRegistry {
    sessions: DashMap<String, HashSet<String>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the user's session set.
    pub fn register(&self, user_id: &str, connection_id: &str) -> PresenceTransition {
        let mut sessions = self.sessions.entry(user_id.to_string()).or_default();
        let was_offline = sessions.is_empty();
        sessions.insert(connection_id.to_string());
        if was_offline {
            PresenceTransition::CameOnline
        } else {
            PresenceTransition::Unchanged
        }
    }

    /// Remove a connection from the user's session set. Unknown connection
    /// ids are ignored.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> PresenceTransition {
        match self.sessions.get_mut(user_id) {
            Some(mut sessions) => {
                let removed = sessions.remove(connection_id);
                if removed && sessions.is_empty() {
                    PresenceTransition::WentOffline
                } else {
                    PresenceTransition::Unchanged
                }
            }
            None => PresenceTransition::Unchanged,
        }
    }

    /// Current set of online user ids. Used to hydrate a newly authenticated
    /// client, not polled.
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        users.sort();
        users
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions
            .get(user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    /// Live connection ids for one user (all their devices).
    pub fn connection_ids(&self, user_id: &str) -> Vec<String> {
        self.sessions
            .get(user_id)
            .map(|sessions| sessions.iter().cloned().collect())
            .unwrap_or_default()
    }
}

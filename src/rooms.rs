//! Room membership: which connections receive broadcasts for which
//! conversation. A room is the broadcast group for one conversation.
//!
//! Membership is keyed by connection, not user, so each device subscribes
//! independently and a closed connection's memberships are discarded with it.
//! Authorization (is this user a participant?) happens in the protocol layer
//! before join is called; this registry is pure bookkeeping.

use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Default)]
pub struct RoomRegistry {
    /// conversation id -> subscribed connection ids
    rooms: DashMap<String, HashSet<String>>,
    /// connection id -> conversation ids, for disconnect cleanup
    joined: DashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a conversation's room. Idempotent.
    pub fn join(&self, connection_id: &str, conversation_id: &str) {
        self.rooms
            .entry(conversation_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.joined
            .entry(connection_id.to_string())
            .or_default()
            .insert(conversation_id.to_string());
    }

    /// Unsubscribe a connection from one room.
    pub fn leave(&self, connection_id: &str, conversation_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(conversation_id) {
            members.remove(connection_id);
        }
        if let Some(mut conversations) = self.joined.get_mut(connection_id) {
            conversations.remove(conversation_id);
        }
    }

    /// Connections currently subscribed to a conversation's room.
    pub fn members(&self, conversation_id: &str) -> Vec<String> {
        self.rooms
            .get(conversation_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection_id: &str, conversation_id: &str) -> bool {
        self.rooms
            .get(conversation_id)
            .map(|members| members.contains(connection_id))
            .unwrap_or(false)
    }

    /// Drop every membership held by a closed connection.
    pub fn drop_connection(&self, connection_id: &str) {
        let conversations = match self.joined.remove(connection_id) {
            Some((_, conversations)) => conversations,
            None => return,
        };
        for conversation_id in conversations {
            if let Some(mut members) = self.rooms.get_mut(&conversation_id) {
                members.remove(connection_id);
            }
        }
    }
}

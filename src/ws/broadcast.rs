//! Fan-out helpers. Events are serialized once and the resulting text frame
//! is cloned per recipient. A send into a closed channel means that
//! connection is already tearing down; the failure is logged at debug level
//! and never propagated — a partial fan-out must not fail the operation that
//! triggered it.

use axum::extract::ws::Message;

use crate::rooms::RoomRegistry;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionRegistry, ConnectionSender};

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            None
        }
    }
}

/// Send an event directly down one connection's channel.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        if tx.send(msg).is_err() {
            tracing::debug!("Dropped event for closed connection");
        }
    }
}

/// Broadcast an event to every open connection (presence changes).
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for entry in registry.iter() {
        if entry.value().tx.send(msg.clone()).is_err() {
            tracing::debug!(connection_id = %entry.key(), "Fan-out skipped closed connection");
        }
    }
}

/// Deliver an event to every connection joined to a conversation's room,
/// the sender's own joined devices included.
pub fn broadcast_to_room(
    registry: &ConnectionRegistry,
    rooms: &RoomRegistry,
    conversation_id: &str,
    event: &ServerEvent,
) {
    let Some(msg) = encode(event) else { return };
    for connection_id in rooms.members(conversation_id) {
        match registry.get(&connection_id) {
            Some(entry) => {
                if entry.tx.send(msg.clone()).is_err() {
                    tracing::debug!(
                        connection_id = %connection_id,
                        conversation_id = %conversation_id,
                        "Fan-out skipped closed connection"
                    );
                }
            }
            None => {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Room member no longer in connection registry"
                );
            }
        }
    }
}

/// Room broadcast that skips every connection belonging to `excluded_user`.
/// Used for typing updates, which are never echoed back to their author.
pub fn broadcast_to_room_except_user(
    registry: &ConnectionRegistry,
    rooms: &RoomRegistry,
    conversation_id: &str,
    excluded_user: &str,
    event: &ServerEvent,
) {
    let Some(msg) = encode(event) else { return };
    for connection_id in rooms.members(conversation_id) {
        let Some(entry) = registry.get(&connection_id) else {
            continue;
        };
        if entry.user_id.as_deref() == Some(excluded_user) {
            continue;
        }
        let _ = entry.tx.send(msg.clone());
    }
}

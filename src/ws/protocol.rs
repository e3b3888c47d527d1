//! Wire protocol: JSON text frames shaped `{ "event": "...", "data": {...} }`
//! with kebab-case event names and camelCase payload fields, plus the
//! dispatcher that routes decoded client events to the presence registry,
//! room registry, typing tracker and ingestion pipeline.

use serde::{Deserialize, Serialize};

use crate::chat::pipeline;
use crate::db::models::{AttachmentMeta, MessageKind, MessageRecord};
use crate::error::ChatError;
use crate::state::AppState;
use crate::ws::broadcast::{
    broadcast_to_all, broadcast_to_room, broadcast_to_room_except_user, send_event,
};
use crate::ws::ConnectionSender;

/// Events a client may send.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Authenticate {
        user_id: String,
        #[serde(default)]
        device_id: Option<String>,
    },
    SendMessage(SendMessagePayload),
    SetTyping {
        conversation_id: String,
        is_typing: bool,
    },
    JoinConversation {
        conversation_id: String,
    },
    LeaveConversation {
        conversation_id: String,
    },
    MarkRead {
        conversation_id: String,
    },
    Heartbeat,
}

/// Raw send-message payload. Required fields stay optional here so their
/// absence surfaces as a `validation` error from the pipeline rather than a
/// decode failure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessagePayload {
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<MessageKind>,
    pub attachment: Option<AttachmentMeta>,
}

/// Events the server emits.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Socket is open; identity not yet accepted.
    Connected { connection_id: String },
    Authenticated {
        user_id: String,
        online_users: Vec<String>,
    },
    AuthenticationFailed { reason: String },
    OnlineUsersChanged { user_ids: Vec<String> },
    UserStatusChanged {
        user_id: String,
        is_online: bool,
        last_seen_at: String,
    },
    /// Room fan-out of a newly persisted message.
    Message { message: MessageRecord },
    /// Direct acknowledgement to the sending connection, carrying the
    /// persisted record. Decoupled from the room broadcast so the sender's
    /// UI never depends on fan-out delivery.
    MessageSent { message: MessageRecord },
    ConversationUpdated {
        conversation_id: String,
        preview: String,
        at: String,
    },
    Typing {
        user_id: String,
        is_typing: bool,
        conversation_id: String,
    },
    MessageError { kind: String, reason: String },
    /// Failure channel for non-send requests (join, mark-read, malformed frames).
    Error { kind: String, reason: String },
    HeartbeatAck,
}

fn error_event(err: &ChatError) -> ServerEvent {
    ServerEvent::Error {
        kind: err.kind().to_string(),
        reason: err.to_string(),
    }
}

/// Handle one incoming text frame: decode and dispatch.
/// `session_user` is the connection's authenticated identity, owned by the
/// actor's reader loop; authenticate is the only event that sets it.
pub async fn handle_text_message(
    text: &str,
    connection_id: &str,
    tx: &ConnectionSender,
    state: &AppState,
    session_user: &mut Option<String>,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e,
                "Failed to decode client event"
            );
            send_event(
                tx,
                &ServerEvent::Error {
                    kind: "validation".to_string(),
                    reason: format!("unrecognized event: {e}"),
                },
            );
            return;
        }
    };

    match event {
        ClientEvent::Authenticate { user_id, device_id } => {
            handle_authenticate(state, connection_id, tx, session_user, user_id, device_id).await;
        }
        ClientEvent::Heartbeat => {
            send_event(tx, &ServerEvent::HeartbeatAck);
        }
        other => {
            // Everything else requires an authenticated connection.
            let Some(user_id) = session_user.clone() else {
                send_event(
                    tx,
                    &ServerEvent::Error {
                        kind: "authorization".to_string(),
                        reason: "not authenticated".to_string(),
                    },
                );
                return;
            };
            match other {
                ClientEvent::SendMessage(payload) => {
                    handle_send_message(state, tx, &user_id, payload).await;
                }
                ClientEvent::SetTyping {
                    conversation_id,
                    is_typing,
                } => {
                    handle_set_typing(state, &user_id, &conversation_id, is_typing);
                }
                ClientEvent::JoinConversation { conversation_id } => {
                    handle_join(state, connection_id, tx, &user_id, &conversation_id).await;
                }
                ClientEvent::LeaveConversation { conversation_id } => {
                    state.rooms.leave(connection_id, &conversation_id);
                }
                ClientEvent::MarkRead { conversation_id } => {
                    handle_mark_read(state, tx, &user_id, &conversation_id).await;
                }
                ClientEvent::Authenticate { .. } | ClientEvent::Heartbeat => unreachable!(),
            }
        }
    }
}

async fn handle_authenticate(
    state: &AppState,
    connection_id: &str,
    tx: &ConnectionSender,
    session_user: &mut Option<String>,
    user_id: String,
    device_id: Option<String>,
) {
    if session_user.is_some() {
        send_event(
            tx,
            &ServerEvent::Error {
                kind: "validation".to_string(),
                reason: "connection is already authenticated".to_string(),
            },
        );
        return;
    }
    if user_id.is_empty() {
        send_event(
            tx,
            &ServerEvent::AuthenticationFailed {
                reason: "userId is required".to_string(),
            },
        );
        return;
    }

    let user = match state.store.find_user(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            // Connection stays open in the unauthenticated state; the
            // client may retry without reconnecting.
            send_event(
                tx,
                &ServerEvent::AuthenticationFailed {
                    reason: format!("unknown user id {user_id}"),
                },
            );
            return;
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Identity lookup failed");
            send_event(
                tx,
                &ServerEvent::AuthenticationFailed {
                    reason: "identity lookup failed".to_string(),
                },
            );
            return;
        }
    };

    // Bind the connection to the user before announcing presence, so room
    // exclusion by user works from the first broadcast.
    if let Some(mut entry) = state.connections.get_mut(connection_id) {
        entry.user_id = Some(user.id.clone());
    }
    *session_user = Some(user.id.clone());

    let transition = state.presence.register(&user.id, connection_id);
    if transition == crate::presence::PresenceTransition::CameOnline {
        publish_presence_transition(state, &user.id).await;
    }

    // Subscribe this connection to every conversation the user is in, so a
    // reconnecting client receives live messages for old conversations
    // without per-conversation join requests.
    match state.store.conversations_for_user(&user.id).await {
        Ok(conversations) => {
            for conversation in &conversations {
                state.rooms.join(connection_id, &conversation.id);
            }
            tracing::debug!(
                user_id = %user.id,
                rooms = conversations.len(),
                "Joined all conversation rooms"
            );
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Room hydration failed");
        }
    }

    tracing::info!(
        user_id = %user.id,
        connection_id = %connection_id,
        device_id = device_id.as_deref().unwrap_or("-"),
        "Connection authenticated"
    );

    send_event(
        tx,
        &ServerEvent::Authenticated {
            user_id: user.id,
            online_users: state.presence.snapshot(),
        },
    );
}

async fn handle_send_message(
    state: &AppState,
    tx: &ConnectionSender,
    user_id: &str,
    payload: SendMessagePayload,
) {
    // A connection may only send as the identity it authenticated with. A
    // missing senderId still falls through to the pipeline's validation.
    if let Some(sender_id) = payload.sender_id.as_deref() {
        if !sender_id.is_empty() && sender_id != user_id {
            send_event(
                tx,
                &ServerEvent::MessageError {
                    kind: "authorization".to_string(),
                    reason: "senderId does not match the authenticated user".to_string(),
                },
            );
            return;
        }
    }
    match pipeline::ingest(state, payload).await {
        Ok(outcome) => {
            let conversation_id = outcome.message.conversation_id.clone();
            // Direct acknowledgement first: the sender's UI must not depend
            // on broadcast delivery succeeding.
            send_event(
                tx,
                &ServerEvent::MessageSent {
                    message: outcome.message.clone(),
                },
            );
            broadcast_to_room(
                &state.connections,
                &state.rooms,
                &conversation_id,
                &ServerEvent::Message {
                    message: outcome.message.clone(),
                },
            );
            broadcast_to_room(
                &state.connections,
                &state.rooms,
                &conversation_id,
                &ServerEvent::ConversationUpdated {
                    conversation_id: conversation_id.clone(),
                    preview: outcome.preview,
                    at: outcome.message.created_at.clone(),
                },
            );
        }
        Err(e) => {
            send_event(
                tx,
                &ServerEvent::MessageError {
                    kind: e.kind().to_string(),
                    reason: e.to_string(),
                },
            );
        }
    }
}

fn handle_set_typing(state: &AppState, user_id: &str, conversation_id: &str, is_typing: bool) {
    state.typing.set_typing(conversation_id, user_id, is_typing);
    // Broadcast the new value to the rest of the room; never echoed back to
    // the author's own connections.
    broadcast_to_room_except_user(
        &state.connections,
        &state.rooms,
        conversation_id,
        user_id,
        &ServerEvent::Typing {
            user_id: user_id.to_string(),
            is_typing,
            conversation_id: conversation_id.to_string(),
        },
    );
}

async fn handle_join(
    state: &AppState,
    connection_id: &str,
    tx: &ConnectionSender,
    user_id: &str,
    conversation_id: &str,
) {
    let result = async {
        let conversation = state
            .store
            .conversation(conversation_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;
        if !conversation.participant_ids.iter().any(|p| p == user_id) {
            return Err(ChatError::Authorization(
                "not a participant of this conversation".to_string(),
            ));
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => state.rooms.join(connection_id, conversation_id),
        // A refused join has no side effect.
        Err(e) => send_event(tx, &error_event(&e)),
    }
}

async fn handle_mark_read(
    state: &AppState,
    tx: &ConnectionSender,
    user_id: &str,
    conversation_id: &str,
) {
    let result = async {
        let conversation = state
            .store
            .conversation(conversation_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;
        if !conversation.participant_ids.iter().any(|p| p == user_id) {
            return Err(ChatError::Authorization(
                "not a participant of this conversation".to_string(),
            ));
        }
        state.store.mark_conversation_read(conversation_id, user_id).await
    }
    .await;

    match result {
        Ok(marked) => {
            tracing::debug!(
                user_id = %user_id,
                conversation_id = %conversation_id,
                marked = marked,
                "Marked conversation read"
            );
        }
        Err(e) => send_event(tx, &error_event(&e)),
    }
}

/// Tell every open connection about a presence flip, then persist the flag.
///
/// Both the online flag and the online-users snapshot are read from the
/// registry at broadcast time, never captured at transition time. Publishes
/// for one user can overtake each other (a delayed disconnect publish racing
/// a reconnect's), and a payload fixed earlier would deliver a stale
/// "offline" after a newer "online"; reading at broadcast time makes the
/// last delivered broadcast agree with the registry. The store write happens
/// after the broadcasts so no await sits between the registry read and the
/// fan-out.
pub(crate) async fn publish_presence_transition(state: &AppState, user_id: &str) {
    let last_seen_at = chrono::Utc::now().to_rfc3339();
    let is_online = state.presence.is_online(user_id);

    broadcast_to_all(
        &state.connections,
        &ServerEvent::UserStatusChanged {
            user_id: user_id.to_string(),
            is_online,
            last_seen_at: last_seen_at.clone(),
        },
    );
    broadcast_to_all(
        &state.connections,
        &ServerEvent::OnlineUsersChanged {
            user_ids: state.presence.snapshot(),
        },
    );

    if let Err(e) = state
        .store
        .set_user_presence(user_id, is_online, &last_seen_at)
        .await
    {
        // The registry, not the table, is the source of truth for liveness;
        // a failed flag write is logged and the broadcasts already went out.
        tracing::warn!(user_id = %user_id, error = %e, "Presence flag persistence failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TradeRole;
    use crate::presence::PresenceTransition;
    use crate::ws::ConnectionEntry;
    use axum::extract::ws::Message;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let db = crate::db::init_db(tmp.path().to_str().unwrap()).expect("Failed to init DB");
        (AppState::new(db), tmp)
    }

    #[tokio::test]
    async fn delayed_offline_publish_cannot_mask_a_newer_online() {
        let (state, _tmp) = test_state();
        let user = state
            .store
            .create_user("Asha Retail", TradeRole::Retailer)
            .await
            .unwrap();

        let (watcher_tx, mut watcher_rx) = tokio::sync::mpsc::unbounded_channel();
        state.connections.insert(
            "watcher".to_string(),
            ConnectionEntry {
                user_id: None,
                tx: watcher_tx,
            },
        );

        // A tab closes and a new one opens before the offline publish runs.
        state.presence.register(&user.id, "c1");
        assert_eq!(
            state.presence.unregister(&user.id, "c1"),
            PresenceTransition::WentOffline
        );
        assert_eq!(
            state.presence.register(&user.id, "c2"),
            PresenceTransition::CameOnline
        );

        // The reconnect's publish completes first; the disconnect's runs
        // late. The late one must not deliver a stale "offline".
        publish_presence_transition(&state, &user.id).await;
        publish_presence_transition(&state, &user.id).await;

        let mut last_status = None;
        while let Ok(msg) = watcher_rx.try_recv() {
            if let Message::Text(text) = msg {
                let event: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if event["event"] == "user-status-changed" {
                    last_status = Some(event["data"]["isOnline"].as_bool().unwrap());
                }
            }
        }
        assert_eq!(last_status, Some(true));
        assert!(state.presence.is_online(&user.id));

        let stored = state.store.find_user(&user.id).await.unwrap().unwrap();
        assert!(stored.online);
    }
}

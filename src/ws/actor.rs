//! Connection lifecycle controller, actor-per-connection.
//!
//! Each WebSocket gets one reader loop plus a spawned writer task that owns
//! the sink behind an mpsc channel; any part of the system can push frames to
//! the client by cloning the sender. A connection starts unauthenticated,
//! receives `connected` immediately, and only joins the presence registry and
//! conversation rooms once an in-band `authenticate` succeeds. Cleanup runs
//! exactly once per connection — there is a single exit path from the reader
//! loop — regardless of how the connection ended.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::presence::PresenceTransition;
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_room_except_user, send_event};
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::ConnectionEntry;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor for one WebSocket connection.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::now_v7().to_string();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    state.connections.insert(
        connection_id.clone(),
        ConnectionEntry {
            user_id: None,
            tx: tx.clone(),
        },
    );

    // Confirm the socket is open before any authentication happens, so the
    // client can distinguish "socket open" from "identity accepted".
    send_event(
        &tx,
        &ServerEvent::Connected {
            connection_id: connection_id.clone(),
        },
    );

    tracing::info!(connection_id = %connection_id, "WebSocket actor started");

    // Writer task: owns the sink, forwards frames from the mpsc channel.
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Ping task: periodic pings, close on missed pong.
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // The connection's authenticated identity, set by the authenticate event.
    let mut session_user: Option<String> = None;

    // Reader loop: events on one connection are processed sequentially, so a
    // single sender's messages are persisted and broadcast in send order.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(
                        text.as_str(),
                        &connection_id,
                        &tx,
                        &state,
                        &mut session_user,
                    )
                    .await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        "Received binary frame (protocol is JSON text); ignoring"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    disconnect_cleanup(&state, &connection_id, session_user.as_deref()).await;

    tracing::info!(connection_id = %connection_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

/// Tear down everything this connection contributed to shared state:
/// connection registry entry, room memberships, the user's typing entries,
/// and — only when this was the user's last connection — their presence.
async fn disconnect_cleanup(state: &AppState, connection_id: &str, user_id: Option<&str>) {
    state.connections.remove(connection_id);
    state.rooms.drop_connection(connection_id);

    let Some(user_id) = user_id else {
        // Never authenticated: nothing was registered beyond the socket.
        return;
    };

    // A dead tab must not leave the typing indicator wedged: emit one
    // "stopped typing" per conversation the user was composing in.
    for conversation_id in state.typing.clear_user(user_id) {
        broadcast_to_room_except_user(
            &state.connections,
            &state.rooms,
            &conversation_id,
            user_id,
            &ServerEvent::Typing {
                user_id: user_id.to_string(),
                is_typing: false,
                conversation_id: conversation_id.clone(),
            },
        );
    }

    // Presence flips offline only when the user's last connection closes;
    // other devices keep them online with no broadcast at all.
    if state.presence.unregister(user_id, connection_id) == PresenceTransition::WentOffline {
        protocol::publish_presence_transition(state, user_id).await;
    }
}

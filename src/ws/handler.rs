use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. The upgrade itself is unauthenticated;
/// identity is established in-band via the `authenticate` event, so a failed
/// authentication can be retried without reconnecting.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    actor::run_connection(socket, state).await;
}

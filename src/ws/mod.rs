pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// One live connection. `user_id` is None until the connection authenticates.
#[derive(Clone)]
pub struct ConnectionEntry {
    pub user_id: Option<String>,
    pub tx: ConnectionSender,
}

/// Connection registry: every open WebSocket, keyed by connection id.
/// A user can hold several entries at once (multiple devices/tabs); the
/// presence registry maps users back to their connection ids.
pub type ConnectionRegistry = Arc<DashMap<String, ConnectionEntry>>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}

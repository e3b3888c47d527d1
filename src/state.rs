use std::sync::Arc;

use crate::db::DbPool;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::store::MessageStore;
use crate::typing::TypingTracker;
use crate::ws::{new_connection_registry, ConnectionRegistry};

/// Shared application state passed to all handlers via axum State extractor.
///
/// This is the composition root: the presence registry, room registry and
/// typing tracker are constructor-injected here rather than reached through
/// module-level globals, so every test can build a fresh instance. All three
/// are process-memory only — a restart forgets them and every user is
/// implicitly offline until reconnect.
#[derive(Clone)]
pub struct AppState {
    /// Durable conversations/messages plus the user table.
    pub store: MessageStore,
    /// Who is online, and from which connections.
    pub presence: Arc<PresenceRegistry>,
    /// Which connections receive broadcasts for which conversation.
    pub rooms: Arc<RoomRegistry>,
    /// Who is composing in which conversation.
    pub typing: Arc<TypingTracker>,
    /// Every open WebSocket, keyed by connection id.
    pub connections: ConnectionRegistry,
}

impl AppState {
    pub fn new(db: DbPool) -> Self {
        Self {
            store: MessageStore::new(db),
            presence: Arc::new(PresenceRegistry::new()),
            rooms: Arc::new(RoomRegistry::new()),
            typing: Arc::new(TypingTracker::new()),
            connections: new_connection_registry(),
        }
    }
}

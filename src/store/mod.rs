//! Persistent message store: durable conversations and messages, plus the
//! user table backing identity lookups.
//!
//! rusqlite is synchronous, so every operation clones the shared pool and
//! runs its queries on the blocking thread pool. A create either fully
//! succeeds or has no effect: multi-statement writes run in a transaction.

pub mod conversations;
pub mod messages;
pub mod users;

use crate::db::DbPool;
use crate::error::ChatError;

/// Store handle, cheap to clone (shares the underlying pool).
#[derive(Clone)]
pub struct MessageStore {
    db: DbPool,
}

impl MessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run a closure against the connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, ChatError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| ChatError::Persistence("database lock poisoned".into()))?;
            f(&conn)
        })
        .await?
    }
}

/// Server-assigned timestamps, RFC 3339 UTC.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

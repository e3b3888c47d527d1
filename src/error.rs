use thiserror::Error;

/// Error taxonomy for the realtime core.
///
/// Everything detected before the persistence point is returned to the
/// originating request as an acknowledgement-style failure. Failures after a
/// message has been persisted (partial fan-out, summary update) are logged
/// only and never surfaced to the sender.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required field was missing or empty. The caller can correct and resend.
    #[error("validation: {0}")]
    Validation(String),

    /// The acting user is not allowed to perform the operation
    /// (not a participant, role pairing refused, unauthenticated request).
    #[error("authorization: {0}")]
    Authorization(String),

    /// A referenced conversation or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store was unavailable or rejected a write. The whole operation is
    /// aborted; no partial message record exists.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ChatError {
    /// Stable kind string carried on the wire so clients can decide whether
    /// a retry makes sense.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::Authorization(_) => "authorization",
            ChatError::NotFound(_) => "not-found",
            ChatError::Persistence(_) => "persistence-failure",
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

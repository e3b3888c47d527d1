//! Message ingestion pipeline: validate -> authorize -> persist -> update the
//! conversation summary. The caller (protocol layer) owns the two output
//! channels — direct acknowledgement to the sender and room fan-out — so the
//! durability/broadcast failure distinction stays enforceable.
//!
//! Failure semantics: any error before the message insert aborts the whole
//! operation and leaves no record. A failed summary update after the insert
//! is logged and swallowed; the message is already durable and will be
//! acknowledged and broadcast.

use crate::db::models::{MessageKind, MessageRecord};
use crate::error::ChatError;
use crate::state::AppState;
use crate::ws::protocol::SendMessagePayload;

/// Longest preview stored on the conversation list cache.
const PREVIEW_MAX_CHARS: usize = 120;

/// Result of a successful ingest: the persisted record plus the preview
/// written to the conversation summary.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub message: MessageRecord,
    pub preview: String,
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, ChatError> {
    match field.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ChatError::Validation(format!("{name} is required"))),
    }
}

/// Type-appropriate human-readable summary for the conversation list.
fn preview_for(message: &MessageRecord) -> String {
    match message.kind {
        MessageKind::Text => message.content.chars().take(PREVIEW_MAX_CHARS).collect(),
        MessageKind::Image => "image".to_string(),
        MessageKind::Audio => "voice message".to_string(),
        MessageKind::Document => message
            .attachment
            .as_ref()
            .and_then(|meta| meta.file_name.clone())
            .unwrap_or_else(|| "document".to_string()),
    }
}

/// Run a composed message through the pipeline.
pub async fn ingest(state: &AppState, payload: SendMessagePayload) -> Result<IngestOutcome, ChatError> {
    // 1. Field validation. Nothing has happened yet on failure.
    let conversation_id = required(&payload.conversation_id, "conversationId")?.to_string();
    let sender_id = required(&payload.sender_id, "senderId")?.to_string();

    // 2. Authorization. Re-checked per message, not cached: participant sets
    //    can shrink between connect and send.
    let conversation = state
        .store
        .conversation(&conversation_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;
    if !conversation.participant_ids.iter().any(|p| p == &sender_id) {
        return Err(ChatError::Authorization(
            "sender is not a participant of this conversation".to_string(),
        ));
    }
    let sender = state
        .store
        .find_user(&sender_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("user {sender_id}")))?;

    // 3. Persistence — the durability point.
    let message = state
        .store
        .create_message(
            &conversation_id,
            &sender,
            payload.content.as_deref().unwrap_or_default(),
            payload.kind.unwrap_or_default(),
            payload.attachment,
        )
        .await?;

    // 4. Conversation summary. The message is durable; a failure here is
    //    logged, not surfaced.
    let preview = preview_for(&message);
    if let Err(e) = state
        .store
        .update_conversation_summary(&conversation_id, &preview, &message.created_at)
        .await
    {
        tracing::warn!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            error = %e,
            "Conversation summary update failed after persist"
        );
    }

    Ok(IngestOutcome { message, preview })
}

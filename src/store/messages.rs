//! Message writes and read-state tracking.
//!
//! Messages are append-only once written; the readBy set only ever grows and
//! by construction never contains the sender.

use rusqlite::{params, Connection, OptionalExtension};

use super::users::find_user_sync;
use super::{now_rfc3339, MessageStore};
use crate::db::models::{AttachmentMeta, MessageKind, MessageRecord, User};
use crate::error::ChatError;

fn read_by_sync(conn: &Connection, message_id: &str) -> Result<Vec<String>, ChatError> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY user_id",
    )?;
    let readers: Vec<String> = stmt
        .query_map(params![message_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(readers)
}

impl MessageStore {
    /// Persist a new message with server-assigned id and timestamp, returning
    /// the fully hydrated record. This is the durability point of the
    /// ingestion pipeline: once this returns Ok, the message survives
    /// regardless of later broadcast failures.
    pub async fn create_message(
        &self,
        conversation_id: &str,
        sender: &User,
        content: &str,
        kind: MessageKind,
        attachment: Option<AttachmentMeta>,
    ) -> Result<MessageRecord, ChatError> {
        let conversation_id = conversation_id.to_string();
        let sender = sender.clone();
        let content = content.to_string();
        self.with_conn(move |conn| {
            let id = uuid::Uuid::now_v7().to_string();
            let created_at = now_rfc3339();
            let meta = attachment.clone().unwrap_or_default();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, kind,
                                       file_url, file_name, file_size, file_type,
                                       storage_ref, duration_seconds, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id,
                    conversation_id,
                    sender.id,
                    content,
                    kind.as_str(),
                    meta.file_url,
                    meta.file_name,
                    meta.file_size,
                    meta.file_type,
                    meta.storage_ref,
                    meta.duration_seconds,
                    created_at,
                ],
            )?;

            Ok(MessageRecord {
                id,
                conversation_id,
                sender_id: sender.id,
                sender_name: sender.display_name,
                sender_role: sender.role,
                content,
                kind,
                attachment: attachment.filter(|a| !a.is_empty()),
                read_by: Vec::new(),
                created_at,
            })
        })
        .await
    }

    /// Mark every message in the conversation as read by `user_id`, except
    /// the user's own messages. Idempotent: re-reading adds nothing, and a
    /// sender can never end up in their own message's read set. Returns the
    /// number of newly marked messages.
    pub async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<usize, ChatError> {
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let marked = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 SELECT id, ?2, ?3 FROM messages
                 WHERE conversation_id = ?1 AND sender_id != ?2",
                params![conversation_id, user_id, now_rfc3339()],
            )?;
            Ok(marked)
        })
        .await
    }

    /// Load one message with its current read set, hydrated with the sender
    /// profile. Mostly a test/introspection convenience; live delivery uses
    /// the record returned by create_message.
    pub async fn message(&self, message_id: &str) -> Result<Option<MessageRecord>, ChatError> {
        let message_id = message_id.to_string();
        self.with_conn(move |conn| {
            let head = conn
                .query_row(
                    "SELECT id, conversation_id, sender_id, content, kind,
                            file_url, file_name, file_size, file_type,
                            storage_ref, duration_seconds, created_at
                     FROM messages WHERE id = ?1",
                    params![message_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            AttachmentMeta {
                                file_url: row.get(5)?,
                                file_name: row.get(6)?,
                                file_size: row.get(7)?,
                                file_type: row.get(8)?,
                                storage_ref: row.get(9)?,
                                duration_seconds: row.get(10)?,
                            },
                            row.get::<_, String>(11)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, conversation_id, sender_id, content, kind_str, meta, created_at)) = head
            else {
                return Ok(None);
            };

            let kind = MessageKind::from_str(&kind_str).ok_or_else(|| {
                ChatError::Persistence(format!("unknown message kind '{kind_str}'"))
            })?;
            let read_by = read_by_sync(conn, &id)?;
            let sender = find_user_sync(conn, &sender_id)?;
            let (sender_name, sender_role) = match sender {
                Some(user) => (user.display_name, user.role),
                // Sender account may have been removed; the message remains.
                None => ("Unknown".to_string(), crate::db::models::TradeRole::Retailer),
            };

            Ok(Some(MessageRecord {
                id,
                conversation_id,
                sender_id,
                sender_name,
                sender_role,
                content,
                kind,
                attachment: Some(meta).filter(|a| !a.is_empty()),
                read_by,
                created_at,
            }))
        })
        .await
    }
}

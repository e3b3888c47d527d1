//! Conversation lifecycle: lazy creation between permitted roles, canonical
//! two-party uniqueness, the denormalized last-message cache, and soft-shrink
//! on leave with cascade deletion once the participant set is empty.

use rusqlite::{params, Connection, OptionalExtension};

use super::users::{find_user_sync, role_communication_allowed};
use super::{now_rfc3339, MessageStore};
use crate::db::models::Conversation;
use crate::error::ChatError;

pub(crate) fn load_conversation_sync(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Option<Conversation>, ChatError> {
    let head = conn
        .query_row(
            "SELECT id, last_message_preview, last_message_at, created_at
             FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, last_message_preview, last_message_at, created_at)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants
         WHERE conversation_id = ?1 ORDER BY user_id",
    )?;
    let participant_ids: Vec<String> = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    Ok(Some(Conversation {
        id,
        participant_ids,
        last_message_preview,
        last_message_at,
        created_at,
    }))
}

/// Find the conversation whose participant set is exactly {a, b}.
fn find_two_party_sync(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<Option<String>, ChatError> {
    let id = conn
        .query_row(
            "SELECT cp.conversation_id FROM conversation_participants cp
             WHERE cp.user_id IN (?1, ?2)
             GROUP BY cp.conversation_id
             HAVING COUNT(DISTINCT cp.user_id) = 2
                AND (SELECT COUNT(*) FROM conversation_participants x
                     WHERE x.conversation_id = cp.conversation_id) = 2",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

impl MessageStore {
    /// Load one conversation with its participant set.
    pub async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| load_conversation_sync(conn, &conversation_id))
            .await
    }

    /// Find the unique two-party conversation between `a` and `b`, if any.
    pub async fn find_conversation_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        let a = a.to_string();
        let b = b.to_string();
        self.with_conn(move |conn| match find_two_party_sync(conn, &a, &b)? {
            Some(id) => load_conversation_sync(conn, &id),
            None => Ok(None),
        })
        .await
    }

    /// Create-or-get the conversation between two users. Created lazily on
    /// first contact; refused when the role pairing is not permitted to
    /// trade. Returns the existing conversation when one already exists, so
    /// the two-party case never duplicates.
    pub async fn open_conversation(
        &self,
        initiator_id: &str,
        recipient_id: &str,
    ) -> Result<Conversation, ChatError> {
        let initiator_id = initiator_id.to_string();
        let recipient_id = recipient_id.to_string();
        self.with_conn(move |conn| {
            if initiator_id == recipient_id {
                return Err(ChatError::Validation(
                    "cannot open a conversation with yourself".into(),
                ));
            }

            let initiator = find_user_sync(conn, &initiator_id)?
                .ok_or_else(|| ChatError::NotFound(format!("user {initiator_id}")))?;
            let recipient = find_user_sync(conn, &recipient_id)?
                .ok_or_else(|| ChatError::NotFound(format!("user {recipient_id}")))?;

            if !role_communication_allowed(initiator.role, recipient.role) {
                return Err(ChatError::Authorization(format!(
                    "{} and {} accounts cannot message each other",
                    initiator.role.as_str(),
                    recipient.role.as_str(),
                )));
            }

            if let Some(id) = find_two_party_sync(conn, &initiator_id, &recipient_id)? {
                return load_conversation_sync(conn, &id)?
                    .ok_or_else(|| ChatError::Persistence(format!("conversation {id} vanished")));
            }

            let id = uuid::Uuid::now_v7().to_string();
            let now = now_rfc3339();
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, created_at) VALUES (?1, ?2)",
                params![id, now],
            )?;
            for user_id in [&initiator_id, &recipient_id] {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, user_id, now],
                )?;
            }
            tx.commit()?;

            let mut participant_ids = vec![initiator_id, recipient_id];
            participant_ids.sort();
            Ok(Conversation {
                id,
                participant_ids,
                last_message_preview: String::new(),
                last_message_at: None,
                created_at: now,
            })
        })
        .await
    }

    /// Every conversation the user currently participates in, most recently
    /// active first. Drives room joins on connect and the client's list view.
    pub async fn conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, ChatError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.id
                 WHERE cp.user_id = ?1
                 ORDER BY CASE WHEN c.last_message_at IS NULL THEN 1 ELSE 0 END,
                          c.last_message_at DESC,
                          c.created_at DESC",
            )?;
            let ids: Vec<String> = stmt
                .query_map(params![user_id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            let mut conversations = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(conversation) = load_conversation_sync(conn, &id)? {
                    conversations.push(conversation);
                }
            }
            Ok(conversations)
        })
        .await
    }

    /// Update the denormalized last-message cache. Called after every
    /// successful message write.
    pub async fn update_conversation_summary(
        &self,
        conversation_id: &str,
        preview: &str,
        at: &str,
    ) -> Result<(), ChatError> {
        let conversation_id = conversation_id.to_string();
        let preview = preview.to_string();
        let at = at.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE conversations SET last_message_preview = ?2, last_message_at = ?3
                 WHERE id = ?1",
                params![conversation_id, preview, at],
            )?;
            if updated == 0 {
                return Err(ChatError::NotFound(format!(
                    "conversation {conversation_id}"
                )));
            }
            Ok(())
        })
        .await
    }

    /// Remove a participant from a conversation. Once the participant set is
    /// empty the conversation is deleted, cascading to its messages and read
    /// rows. Leaving a conversation you are not in is a no-op.
    pub async fn leave_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(), ChatError> {
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM conversation_participants
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;
            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            if remaining == 0 {
                tx.execute(
                    "DELETE FROM conversations WHERE id = ?1",
                    params![conversation_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

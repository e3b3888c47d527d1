//! User lookups and presence flag persistence.
//!
//! Real authentication lives outside this crate; the realtime core only needs
//! `find_user` to validate an identity on connect, `create_user` to seed the
//! table from the embedding application, and `set_user_presence` for the
//! presence registry's transition logic.

use rusqlite::{params, Connection, OptionalExtension};

use super::{now_rfc3339, MessageStore};
use crate::db::models::{TradeRole, User};
use crate::error::ChatError;

/// Which role pairs may open a conversation with each other.
/// Checked only at conversation-creation time, not on every message.
/// Transporters coordinate deliveries with everyone; retailers buy from
/// wholesalers; wholesalers buy from suppliers.
pub fn role_communication_allowed(a: TradeRole, b: TradeRole) -> bool {
    use TradeRole::*;
    match (a, b) {
        (Transporter, _) | (_, Transporter) => true,
        (Retailer, Wholesaler) | (Wholesaler, Retailer) => true,
        (Wholesaler, Supplier) | (Supplier, Wholesaler) => true,
        _ => false,
    }
}

pub(crate) fn find_user_sync(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<User>, ChatError> {
    let found = conn
        .query_row(
            "SELECT id, display_name, role, online, last_seen_at, created_at
             FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    match found {
        Some((id, display_name, role_str, online, last_seen_at, created_at)) => {
            let role = TradeRole::from_str(&role_str).ok_or_else(|| {
                ChatError::Persistence(format!("unknown role '{role_str}' for user {id}"))
            })?;
            Ok(Some(User {
                id,
                display_name,
                role,
                online: online != 0,
                last_seen_at,
                created_at,
            }))
        }
        None => Ok(None),
    }
}

impl MessageStore {
    /// Look up a user by id. Returns None for unknown ids.
    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>, ChatError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| find_user_sync(conn, &user_id)).await
    }

    /// Insert a user with a server-assigned id. Seeding path for the
    /// embedding application and for tests; new users start offline.
    pub async fn create_user(
        &self,
        display_name: &str,
        role: TradeRole,
    ) -> Result<User, ChatError> {
        let display_name = display_name.to_string();
        self.with_conn(move |conn| {
            let id = uuid::Uuid::now_v7().to_string();
            let created_at = now_rfc3339();
            conn.execute(
                "INSERT INTO users (id, display_name, role, online, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![id, display_name, role.as_str(), created_at],
            )?;
            Ok(User {
                id,
                display_name,
                role,
                online: false,
                last_seen_at: None,
                created_at,
            })
        })
        .await
    }

    /// Persist a presence transition: flip the online flag and stamp
    /// last_seen_at. Only the presence registry's transition logic calls this.
    pub async fn set_user_presence(
        &self,
        user_id: &str,
        online: bool,
        last_seen_at: &str,
    ) -> Result<(), ChatError> {
        let user_id = user_id.to_string();
        let last_seen_at = last_seen_at.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE users SET online = ?2, last_seen_at = ?3 WHERE id = ?1",
                params![user_id, online as i64, last_seen_at],
            )?;
            if updated == 0 {
                return Err(ChatError::NotFound(format!("user {user_id}")));
            }
            Ok(())
        })
        .await
    }
}

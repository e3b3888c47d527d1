//! Row and wire types for the tables defined in migrations.rs.
//! The wire protocol serializes these directly (camelCase, matching the
//! client-facing event payloads), so serde derives live here.

use serde::{Deserialize, Serialize};

/// Marketplace role of a user. Conversations may only be opened between
/// role pairs that are allowed to trade with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeRole {
    Retailer,
    Wholesaler,
    Supplier,
    Transporter,
}

impl TradeRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "retailer" => Some(Self::Retailer),
            "wholesaler" => Some(Self::Wholesaler),
            "supplier" => Some(Self::Supplier),
            "transporter" => Some(Self::Transporter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retailer => "retailer",
            Self::Wholesaler => "wholesaler",
            Self::Supplier => "supplier",
            Self::Transporter => "transporter",
        }
    }
}

/// User record in the users table. `online` and `last_seen_at` are mutated
/// exclusively by presence transitions, never by request payloads.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: TradeRole,
    pub online: bool,
    pub last_seen_at: Option<String>,
    pub created_at: String,
}

/// Conversation aggregate: participant set plus the denormalized
/// last-message cache used for list sorting.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub participant_ids: Vec<String>,
    pub last_message_preview: String,
    pub last_message_at: Option<String>,
    pub created_at: String,
}

/// Message payload kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Document,
    Audio,
}

impl MessageKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "document" => Some(Self::Document),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
        }
    }
}

/// Attachment metadata for non-text messages. The file itself lives in an
/// external object store; `storage_ref` is its reference id there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl AttachmentMeta {
    pub fn is_empty(&self) -> bool {
        self.file_url.is_none()
            && self.file_name.is_none()
            && self.file_size.is_none()
            && self.file_type.is_none()
            && self.storage_ref.is_none()
            && self.duration_seconds.is_none()
    }
}

/// Fully hydrated message as delivered to clients: the persisted record plus
/// the minimal sender profile fields the UI needs for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: TradeRole,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentMeta>,
    pub read_by: Vec<String>,
    pub created_at: String,
}

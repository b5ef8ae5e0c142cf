//! Data model: shortcuts, their content kinds and structured payloads.

use serde::{Deserialize, Serialize};
use teloxide::types::MessageEntity;
use tracing::warn;

use crate::bot::error::BotError;

/// The closed set of content kinds a shortcut can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Audio,
    Document,
    Video,
    Voice,
    Location,
    Poll,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Audio => "audio",
            ContentKind::Document => "document",
            ContentKind::Video => "video",
            ContentKind::Voice => "voice",
            ContentKind::Location => "location",
            ContentKind::Poll => "poll",
        }
    }

    /// Parse a stored kind string. Unrecognized strings are an error, not a
    /// silent fallback: every row must carry one of the known kinds.
    pub fn parse(s: &str) -> Result<Self, BotError> {
        match s {
            "text" => Ok(ContentKind::Text),
            "audio" => Ok(ContentKind::Audio),
            "document" => Ok(ContentKind::Document),
            "video" => Ok(ContentKind::Video),
            "voice" => Ok(ContentKind::Voice),
            "location" => Ok(ContentKind::Location),
            "poll" => Ok(ContentKind::Poll),
            other => Err(BotError::UnknownKind(other.to_string())),
        }
    }
}

/// A stored shortcut row.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub id: i64,
    /// Telegram id of the owning user.
    pub owner_id: i64,
    /// Human-chosen name, unique per owner.
    pub name: String,
    pub kind: ContentKind,
    /// Literal text for text shortcuts, caption for media ones.
    pub text: Option<String>,
    /// Media file id, or serialized payload for location/poll.
    pub content: Option<String>,
    /// Formatting spans captured verbatim, as serialized JSON.
    pub entities: Option<String>,
    pub add_dt: String,
    pub update_dt: String,
    pub usage_count: i64,
    pub last_used_dt: Option<String>,
}

/// A registered user.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub registration_dt: String,
    /// Deep-link parameter from the user's first /start, if any.
    pub start_param: Option<String>,
}

/// One line of the admin-only user listing.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub registration_dt: String,
    pub shortcut_count: i64,
    pub start_param: Option<String>,
}

/// Structured payload stored for location shortcuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationPayload {
    pub fn decode(raw: &str) -> Result<Self, BotError> {
        serde_json::from_str(raw).map_err(|e| BotError::Decode {
            kind: "location",
            raw: raw.to_string(),
            detail: e.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        // Two plain f64 fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Structured payload stored for poll shortcuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPayload {
    pub question: String,
    pub options: Vec<String>,
}

impl PollPayload {
    pub fn decode(raw: &str) -> Result<Self, BotError> {
        serde_json::from_str(raw).map_err(|e| BotError::Decode {
            kind: "poll",
            raw: raw.to_string(),
            detail: e.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Serialize formatting spans for storage. They are replayed verbatim later,
/// never re-parsed from markup syntax.
pub fn encode_entities(entities: Option<&[MessageEntity]>) -> Option<String> {
    let entities = entities?;
    if entities.is_empty() {
        return None;
    }
    match serde_json::to_string(entities) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("Failed to serialize {} entities: {e}", entities.len());
            None
        }
    }
}

/// Decode stored formatting spans. A corrupt blob degrades to no formatting
/// rather than failing the whole send.
pub fn decode_entities(raw: Option<&str>) -> Option<Vec<MessageEntity>> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(entities) => Some(entities),
        Err(e) => {
            warn!("Failed to decode stored entities {raw:?}: {e}");
            None
        }
    }
}

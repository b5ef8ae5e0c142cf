//! Error taxonomy for the bot.
//!
//! Handlers catch these at the boundary, log the full detail and reply with
//! one fixed generic message. Internal detail never reaches the chat.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("user {0} is already registered")]
    DuplicateUser(i64),

    #[error("user {0} does not exist")]
    OwnerNotFound(i64),

    #[error("user {owner} already has a shortcut named {name:?}")]
    DuplicateName { owner: i64, name: String },

    #[error("unknown content kind {0:?}")]
    UnknownKind(String),

    #[error("cannot decode {kind} payload {raw:?}: {detail}")]
    Decode {
        kind: &'static str,
        raw: String,
        detail: String,
    },

    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

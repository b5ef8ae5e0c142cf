//! Shortcut Holder bot - stores named pieces of content per user and
//! re-sends them on demand via commands or inline search.

pub mod commands;
pub mod conversation;
pub mod database;
pub mod error;
pub mod inline;
pub mod send;
pub mod shortcut;

use std::collections::HashMap;

use teloxide::types::ChatId;
use tokio::sync::Mutex;

use self::conversation::Conversation;
use self::database::Database;

/// Shared state handed to every handler through dptree.
pub struct BotState {
    pub db: Database,
    /// Per-chat flow state. Keyed by chat id so concurrent flows in
    /// different chats never see each other's pending context.
    pub conversations: Mutex<HashMap<ChatId, Conversation>>,
}

impl BotState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            conversations: Mutex::new(HashMap::new()),
        }
    }
}

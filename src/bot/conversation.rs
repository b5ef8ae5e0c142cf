//! Per-chat conversation state for the /add and /delete flows.
//!
//! State is an explicit tagged enum keyed by chat id; absence of an entry
//! means the chat is idle. An abandoned flow just leaves a stale entry that
//! the next flow start overwrites. Nothing is persisted and nothing is held,
//! so no cleanup is needed.

use teloxide::types::Message;

use crate::bot::shortcut::{ContentKind, LocationPayload, PollPayload, encode_entities};

/// Content captured in the first step of the /add flow, waiting for a name.
#[derive(Debug, Clone)]
pub struct PendingContent {
    pub kind: ContentKind,
    /// Literal text, or caption for media.
    pub text: Option<String>,
    /// Media file id or serialized structured payload.
    pub content: Option<String>,
    /// Formatting spans, serialized for storage.
    pub entities: Option<String>,
}

/// Where a chat currently is in a multi-step flow.
#[derive(Debug, Clone)]
pub enum Conversation {
    /// /add sent, waiting for the content message.
    AwaitingContent,
    /// Content captured, waiting for the shortcut name.
    AwaitingName(PendingContent),
    /// /delete sent, waiting for a keyboard selection.
    AwaitingDeleteSelection,
}

/// Read the content kind and payload off a message. Returns `None` for kinds
/// outside the supported set (stickers, photos, ...), which the caller treats
/// as a re-prompt.
///
/// Media file ids follow the first-or-only rule: teloxide already exposes a
/// single object per logical attachment for every kind we support.
pub fn capture_content(msg: &Message) -> Option<PendingContent> {
    if let Some(text) = msg.text() {
        return Some(PendingContent {
            kind: ContentKind::Text,
            text: Some(text.to_string()),
            content: None,
            entities: encode_entities(msg.entities()),
        });
    }

    let caption = msg.caption().map(str::to_string);
    let caption_entities = encode_entities(msg.caption_entities());

    if let Some(audio) = msg.audio() {
        return Some(PendingContent {
            kind: ContentKind::Audio,
            text: caption,
            content: Some(audio.file.id.0.clone()),
            entities: caption_entities,
        });
    }
    if let Some(document) = msg.document() {
        return Some(PendingContent {
            kind: ContentKind::Document,
            text: caption,
            content: Some(document.file.id.0.clone()),
            entities: caption_entities,
        });
    }
    if let Some(video) = msg.video() {
        return Some(PendingContent {
            kind: ContentKind::Video,
            text: caption,
            content: Some(video.file.id.0.clone()),
            entities: caption_entities,
        });
    }
    if let Some(voice) = msg.voice() {
        return Some(PendingContent {
            kind: ContentKind::Voice,
            text: caption,
            content: Some(voice.file.id.0.clone()),
            entities: caption_entities,
        });
    }
    if let Some(location) = msg.location() {
        let payload = LocationPayload {
            latitude: location.latitude,
            longitude: location.longitude,
        };
        return Some(PendingContent {
            kind: ContentKind::Location,
            text: None,
            content: Some(payload.encode()),
            entities: None,
        });
    }
    if let Some(poll) = msg.poll() {
        let payload = PollPayload {
            question: poll.question.clone(),
            options: poll.options.iter().map(|o| o.text.clone()).collect(),
        };
        return Some(PendingContent {
            kind: ContentKind::Poll,
            text: None,
            content: Some(payload.encode()),
            entities: None,
        });
    }

    None
}

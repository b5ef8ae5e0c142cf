//! Replaying stored shortcut content into a chat.
//!
//! One explicit send call per content kind. The match is exhaustive, so a new
//! kind cannot be added without deciding how it is sent.

use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, InputPollOption, MessageId, ReplyParameters};

use crate::bot::error::BotError;
use crate::bot::shortcut::{ContentKind, LocationPayload, PollPayload, Shortcut, decode_entities};

fn media_file_id(shortcut: &Shortcut) -> Result<FileId, BotError> {
    match &shortcut.content {
        Some(raw) => Ok(FileId(raw.clone())),
        None => Err(BotError::Decode {
            kind: shortcut.kind.as_str(),
            raw: String::new(),
            detail: "missing media file id".to_string(),
        }),
    }
}

fn structured_payload(shortcut: &Shortcut) -> Result<&str, BotError> {
    shortcut.content.as_deref().ok_or_else(|| BotError::Decode {
        kind: shortcut.kind.as_str(),
        raw: String::new(),
        detail: "missing structured payload".to_string(),
    })
}

/// Send a shortcut's content to a chat, replaying stored formatting spans
/// verbatim. A structured payload that fails to decode surfaces as
/// `BotError::Decode` so the caller can skip just that item.
pub async fn send_shortcut_content(
    bot: &Bot,
    chat_id: ChatId,
    shortcut: &Shortcut,
    reply_to: Option<MessageId>,
) -> Result<(), BotError> {
    let entities = decode_entities(shortcut.entities.as_deref());
    let caption = shortcut.text.clone();

    match shortcut.kind {
        ContentKind::Text => {
            let mut req = bot.send_message(chat_id, shortcut.text.clone().unwrap_or_default());
            if let Some(ents) = entities {
                req = req.entities(ents);
            }
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
        ContentKind::Audio => {
            let mut req = bot.send_audio(chat_id, InputFile::file_id(media_file_id(shortcut)?));
            if let Some(cap) = caption {
                req = req.caption(cap);
            }
            if let Some(ents) = entities {
                req = req.caption_entities(ents);
            }
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
        ContentKind::Document => {
            let mut req = bot.send_document(chat_id, InputFile::file_id(media_file_id(shortcut)?));
            if let Some(cap) = caption {
                req = req.caption(cap);
            }
            if let Some(ents) = entities {
                req = req.caption_entities(ents);
            }
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
        ContentKind::Video => {
            let mut req = bot.send_video(chat_id, InputFile::file_id(media_file_id(shortcut)?));
            if let Some(cap) = caption {
                req = req.caption(cap);
            }
            if let Some(ents) = entities {
                req = req.caption_entities(ents);
            }
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
        ContentKind::Voice => {
            let mut req = bot.send_voice(chat_id, InputFile::file_id(media_file_id(shortcut)?));
            if let Some(cap) = caption {
                req = req.caption(cap);
            }
            if let Some(ents) = entities {
                req = req.caption_entities(ents);
            }
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
        ContentKind::Location => {
            let payload = LocationPayload::decode(structured_payload(shortcut)?)?;
            let mut req = bot.send_location(chat_id, payload.latitude, payload.longitude);
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
        ContentKind::Poll => {
            let payload = PollPayload::decode(structured_payload(shortcut)?)?;
            let options: Vec<InputPollOption> =
                payload.options.into_iter().map(InputPollOption::new).collect();
            let mut req = bot.send_poll(chat_id, payload.question, options);
            if let Some(id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(id));
            }
            req.await?;
        }
    }

    Ok(())
}

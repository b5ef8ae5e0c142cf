//! Inline-query responder: search a user's shortcuts and offer each as a
//! selectable result, plus the chosen-result notification that feeds the
//! usage counter.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{
    ChosenInlineResult, FileId, InlineQuery, InlineQueryResult, InlineQueryResultArticle,
    InlineQueryResultCachedAudio, InlineQueryResultCachedDocument, InlineQueryResultCachedVideo,
    InlineQueryResultCachedVoice, InlineQueryResultLocation, InputMessageContent,
    InputMessageContentText,
};
use tracing::{debug, error, warn};

use crate::bot::BotState;
use crate::bot::error::BotError;
use crate::bot::shortcut::{ContentKind, LocationPayload, PollPayload, Shortcut, decode_entities};

/// Results are cached only briefly so a just-added or just-deleted shortcut
/// shows up near-real-time.
const CACHE_SECONDS: u32 = 1;

const MAX_DESCRIPTION_CHARS: usize = 60;

/// Case-sensitive substring filter over shortcut names, falling back to the
/// full set when the query is empty or matches nothing. Always sorted by
/// descending usage counter.
pub fn filter_and_rank<'a>(shortcuts: &'a [Shortcut], query: &str) -> Vec<&'a Shortcut> {
    let mut matched: Vec<&Shortcut> = if query.is_empty() {
        shortcuts.iter().collect()
    } else {
        shortcuts.iter().filter(|s| s.name.contains(query)).collect()
    };
    if matched.is_empty() {
        matched = shortcuts.iter().collect();
    }
    matched.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
    matched
}

fn preview(text: Option<&str>) -> Option<String> {
    let text = text?;
    let short: String = text.chars().take(MAX_DESCRIPTION_CHARS).collect();
    Some(short)
}

/// Render one shortcut as a platform result. The result id is the shortcut id
/// so the chosen-result event can find it again.
fn render_result(shortcut: &Shortcut) -> Result<InlineQueryResult, BotError> {
    let id = shortcut.id.to_string();
    let title = shortcut.name.clone();
    let entities = decode_entities(shortcut.entities.as_deref());

    let media_file_id = || -> Result<FileId, BotError> {
        match &shortcut.content {
            Some(raw) => Ok(FileId(raw.clone())),
            None => Err(BotError::Decode {
                kind: shortcut.kind.as_str(),
                raw: String::new(),
                detail: "missing media file id".to_string(),
            }),
        }
    };

    let result = match shortcut.kind {
        ContentKind::Text => {
            let mut content =
                InputMessageContentText::new(shortcut.text.clone().unwrap_or_default());
            content.entities = entities;
            let mut article =
                InlineQueryResultArticle::new(id, title, InputMessageContent::Text(content));
            article.description = preview(shortcut.text.as_deref());
            InlineQueryResult::Article(article)
        }
        ContentKind::Audio => {
            let mut audio = InlineQueryResultCachedAudio::new(id, media_file_id()?);
            audio.caption = shortcut.text.clone();
            audio.caption_entities = entities;
            InlineQueryResult::CachedAudio(audio)
        }
        ContentKind::Document => {
            let mut document = InlineQueryResultCachedDocument::new(id, title, media_file_id()?);
            document.caption = shortcut.text.clone();
            document.caption_entities = entities;
            InlineQueryResult::CachedDocument(document)
        }
        ContentKind::Video => {
            let mut video = InlineQueryResultCachedVideo::new(id, media_file_id()?, title);
            video.caption = shortcut.text.clone();
            video.caption_entities = entities;
            InlineQueryResult::CachedVideo(video)
        }
        ContentKind::Voice => {
            let mut voice = InlineQueryResultCachedVoice::new(id, media_file_id()?, title);
            voice.caption = shortcut.text.clone();
            voice.caption_entities = entities;
            InlineQueryResult::CachedVoice(voice)
        }
        ContentKind::Location => {
            let raw = shortcut.content.as_deref().unwrap_or_default();
            let payload = LocationPayload::decode(raw)?;
            let location =
                InlineQueryResultLocation::new(id, title, payload.latitude, payload.longitude);
            InlineQueryResult::Location(location)
        }
        ContentKind::Poll => {
            // Polls cannot be sent through inline mode; offer a text rendering.
            let raw = shortcut.content.as_deref().unwrap_or_default();
            let payload = PollPayload::decode(raw)?;
            let mut text = payload.question.clone();
            for option in &payload.options {
                text.push_str("\n- ");
                text.push_str(option);
            }
            let content = InputMessageContentText::new(text);
            let mut article =
                InlineQueryResultArticle::new(id, title, InputMessageContent::Text(content));
            article.description = Some(payload.question);
            InlineQueryResult::Article(article)
        }
    };
    Ok(result)
}

/// Static placeholder offered to a user who has no shortcuts at all.
fn onboarding_result() -> InlineQueryResult {
    let content = InputMessageContent::Text(InputMessageContentText::new(
        "I keep reusable shortcuts - named texts, files, locations and polls - \
and send them anywhere via inline search. Message me and send /add to create your first one.",
    ));
    let mut article = InlineQueryResultArticle::new(
        "onboarding",
        "You don't have any shortcuts yet",
        content,
    );
    article.description = Some("Open a chat with me and send /add".to_string());
    InlineQueryResult::Article(article)
}

fn build_results(state: &BotState, owner_id: i64, query: &str) -> Result<Vec<InlineQueryResult>, BotError> {
    let shortcuts = state.db.get_shortcuts(owner_id)?;
    if shortcuts.is_empty() {
        return Ok(vec![onboarding_result()]);
    }

    let mut results = Vec::new();
    for shortcut in filter_and_rank(&shortcuts, query) {
        match render_result(shortcut) {
            Ok(r) => results.push(r),
            // One corrupt payload must not empty the whole answer.
            Err(e) => warn!("Skipping shortcut {} in inline answer: {e}", shortcut.id),
        }
    }
    Ok(results)
}

pub async fn handle_inline_query(
    bot: Bot,
    query: InlineQuery,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let owner_id = query.from.id.0 as i64;
    debug!("Inline query {:?} from user {}", query.query, owner_id);

    let results = match build_results(&state, owner_id, &query.query) {
        Ok(results) => results,
        Err(e) => {
            error!("Failed to build inline results for user {}: {e}", owner_id);
            Vec::new()
        }
    };

    bot.answer_inline_query(query.id, results)
        .cache_time(CACHE_SECONDS)
        .is_personal(true)
        .await?;
    Ok(())
}

/// The platform reports the user actually picked a result: bump the usage
/// counter. Delivery is at-least-once, the increment tolerates redelivery.
pub async fn handle_chosen_inline_result(
    chosen: ChosenInlineResult,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let Ok(shortcut_id) = chosen.result_id.parse::<i64>() else {
        // The onboarding placeholder has a non-numeric id.
        return Ok(());
    };

    if let Err(e) = state.db.increment_usage(shortcut_id) {
        error!("Failed to record usage of shortcut {shortcut_id}: {e}");
    }
    Ok(())
}

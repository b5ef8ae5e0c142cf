//! Command dispatcher and conversation step routing.

use std::sync::Arc;

use rand::seq::SliceRandom;
use teloxide::prelude::*;
use teloxide::types::{
    KeyboardButton, KeyboardMarkup, KeyboardRemove, Message, ParseMode, ReplyParameters, User,
};
use tracing::{error, info, warn};

use crate::bot::BotState;
use crate::bot::conversation::{Conversation, capture_content};
use crate::bot::database::Database;
use crate::bot::error::BotError;
use crate::bot::send::send_shortcut_content;
use crate::bot::shortcut::UserSummary;

const HELP_MESSAGE: &str = "Here are methods you can use:
/help - send this message
/list - list all existing shortcuts
/add - add a new shortcut
/delete - delete an existing shortcut by its name

To send a shortcut anywhere, type my username and a part of its name in any chat.";

const ERROR_MESSAGE: &str =
    "Sorry, something went wrong. If you see this message, please try again later.";

const NO_SHORTCUTS_MESSAGE: &str =
    "You don't have any shortcuts, but you can simply add one by clicking here: /add";

const ADD_PROMPT: &str = "Send me any one message you want. It can be a text and/or one of the \
following media types: audio, document, video, voice message, location or poll. E.g. you can \
send me your business card like this one:
<pre>Name: Shortcut Holder
Position: Telegram Bot
Company: Shortcut Holder LLC</pre>";

const UNSUPPORTED_CONTENT_MESSAGE: &str = "I can't store that kind of message. Please send a \
text, audio, document, video, voice message, location or poll.";

const USE_KEYBOARD_MESSAGE: &str = "Please, use the Telegram keyboard";

const PRAISE: &[&str] = &["Great", "Magnificent", "Fantastic", "Wonderful"];

/// Button label for aborting the delete flow. Shortcut names on the keyboard
/// are quoted so a shortcut literally named `Cancel` stays selectable.
const CANCEL_LABEL: &str = "Cancel";

/// Split a command message into its keyword (without the leading slash, with
/// any `@botname` suffix stripped) and the rest of the line.
pub fn parse_command(text: &str) -> Option<(&str, Option<&str>)> {
    let rest = text.trim().strip_prefix('/')?;
    let (keyword, tail) = match rest.split_once(char::is_whitespace) {
        Some((k, t)) => (k, t.trim()),
        None => (rest, ""),
    };
    let keyword = keyword.split('@').next().unwrap_or(keyword);
    if keyword.is_empty() {
        return None;
    }
    Some((keyword, if tail.is_empty() { None } else { Some(tail) }))
}

fn quoted(name: &str) -> String {
    format!("\"{name}\"")
}

/// Strip the quoting `delete_keyboard` adds to button labels.
pub fn strip_quoted(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// One-time reply keyboard for the delete flow: quoted shortcut names two per
/// row, then a Cancel row.
pub fn delete_keyboard(names: &[String]) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = names
        .chunks(2)
        .map(|pair| pair.iter().map(|n| KeyboardButton::new(quoted(n))).collect())
        .collect();
    rows.push(vec![KeyboardButton::new(CANCEL_LABEL)]);
    KeyboardMarkup::new(rows).resize_keyboard().one_time_keyboard()
}

/// What /start or /help answers: a welcome for a first contact (registering
/// the user as a side effect of deciding), or the plain help text.
#[derive(Debug)]
pub enum StartReply {
    Welcome(String),
    Help,
}

pub fn start_reply(
    db: &Database,
    telegram_id: i64,
    username: Option<&str>,
    display_name: &str,
    start_param: Option<&str>,
) -> Result<StartReply, BotError> {
    if db.get_user(telegram_id)?.is_some() {
        return Ok(StartReply::Help);
    }

    db.create_user(telegram_id, username, start_param)?;
    info!("New user {} registered (tag: {:?})", telegram_id, start_param);

    let welcome = format!(
        "Hi, {display_name}! I'm Shortcut Holder, and I will help you to quickly send any \
frequently used information (I call it Shortcut) to whoever you want very easy. I'll show you \
how to do it real quick. Just click here right now: /add"
    );
    Ok(StartReply::Welcome(welcome))
}

/// Report for /get_users, or `None` when the caller is not an admin. A `None`
/// means the command stays completely silent.
pub fn build_users_report(db: &Database, telegram_id: i64) -> Result<Option<String>, BotError> {
    if !db.is_admin(telegram_id)? {
        return Ok(None);
    }
    Ok(Some(format_users_report(&db.list_users_summary()?)))
}

/// Multi-line report for /get_users.
pub fn format_users_report(users: &[UserSummary]) -> String {
    let mut lines = vec![format!("{} user(s):", users.len())];
    for u in users {
        let name = u.username.as_deref().unwrap_or("-");
        let tag = u.start_param.as_deref().unwrap_or("-");
        lines.push(format!(
            "{} ({}) registered {}, {} shortcut(s), tag: {}",
            u.telegram_id, name, u.registration_dt, u.shortcut_count, tag
        ));
    }
    lines.join("\n")
}

/// Entry point for every incoming message: pending conversation steps first,
/// then command dispatch. Failures are logged in full and answered with one
/// fixed generic message.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };

    let pending = state.conversations.lock().await.remove(&msg.chat.id);
    let result = match pending {
        Some(Conversation::AwaitingContent) => handle_add_content(&bot, &msg, &state).await,
        Some(Conversation::AwaitingName(p)) => {
            handle_add_name(&bot, &msg, &user, p, &state).await
        }
        Some(Conversation::AwaitingDeleteSelection) => {
            handle_delete_selection(&bot, &msg, &user, &state).await
        }
        None => dispatch_command(&bot, &msg, &user, &state).await,
    };

    if let Err(e) = result {
        error!("Handler failed for chat {}: {e}", msg.chat.id);
        bot.send_message(msg.chat.id, ERROR_MESSAGE).await.ok();
    }
    Ok(())
}

async fn dispatch_command(
    bot: &Bot,
    msg: &Message,
    user: &User,
    state: &BotState,
) -> Result<(), BotError> {
    let Some((keyword, arg)) = msg.text().and_then(parse_command) else {
        // Free text outside a flow is ignored, like any unknown command.
        return Ok(());
    };

    match keyword {
        "start" => start_or_help(bot, msg, user, arg, state).await,
        "help" => start_or_help(bot, msg, user, None, state).await,
        "add" => handle_add(bot, msg, state).await,
        "list" => handle_list(bot, msg, user, state).await,
        "delete" => handle_delete(bot, msg, user, state).await,
        "get_users" => handle_get_users(bot, msg, user, state).await,
        _ => Ok(()),
    }
}

async fn start_or_help(
    bot: &Bot,
    msg: &Message,
    user: &User,
    start_param: Option<&str>,
    state: &BotState,
) -> Result<(), BotError> {
    let mut display_name = user.first_name.clone();
    if let Some(last) = &user.last_name {
        display_name.push(' ');
        display_name.push_str(last);
    }

    let text = match start_reply(
        &state.db,
        user.id.0 as i64,
        user.username.as_deref(),
        &display_name,
        start_param,
    )? {
        StartReply::Welcome(welcome) => welcome,
        StartReply::Help => HELP_MESSAGE.to_string(),
    };
    bot.send_message(msg.chat.id, text)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

async fn handle_add(bot: &Bot, msg: &Message, state: &BotState) -> Result<(), BotError> {
    bot.send_message(msg.chat.id, ADD_PROMPT)
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    state
        .conversations
        .lock()
        .await
        .insert(msg.chat.id, Conversation::AwaitingContent);
    Ok(())
}

async fn handle_add_content(bot: &Bot, msg: &Message, state: &BotState) -> Result<(), BotError> {
    let Some(pending) = capture_content(msg) else {
        bot.send_message(msg.chat.id, UNSUPPORTED_CONTENT_MESSAGE)
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        state
            .conversations
            .lock()
            .await
            .insert(msg.chat.id, Conversation::AwaitingContent);
        return Ok(());
    };

    let praise = PRAISE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Great");
    bot.send_message(
        msg.chat.id,
        format!("{praise}! Now give me a short name for your shortcut:"),
    )
    .reply_parameters(ReplyParameters::new(msg.id))
    .await?;

    state
        .conversations
        .lock()
        .await
        .insert(msg.chat.id, Conversation::AwaitingName(pending));
    Ok(())
}

async fn handle_add_name(
    bot: &Bot,
    msg: &Message,
    user: &User,
    pending: crate::bot::conversation::PendingContent,
    state: &BotState,
) -> Result<(), BotError> {
    let name = msg.text().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        bot.send_message(msg.chat.id, "The name has to be a short plain text. Try again:")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        state
            .conversations
            .lock()
            .await
            .insert(msg.chat.id, Conversation::AwaitingName(pending));
        return Ok(());
    }

    state.db.add_shortcut(
        user.id.0 as i64,
        name,
        pending.kind,
        pending.text.as_deref(),
        pending.content.as_deref(),
        pending.entities.as_deref(),
    )?;

    info!("User {} saved {} shortcut {:?}", user.id, pending.kind.as_str(), name);
    bot.send_message(
        msg.chat.id,
        format!("Shortcut \"{name}\" was successfully saved!"),
    )
    .reply_parameters(ReplyParameters::new(msg.id))
    .await?;
    Ok(())
}

async fn handle_list(
    bot: &Bot,
    msg: &Message,
    user: &User,
    state: &BotState,
) -> Result<(), BotError> {
    let shortcuts = state.db.get_shortcuts(user.id.0 as i64)?;
    if shortcuts.is_empty() {
        bot.send_message(msg.chat.id, NO_SHORTCUTS_MESSAGE)
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        format!("You have {} shortcut(s) in total, here they are:", shortcuts.len()),
    )
    .reply_parameters(ReplyParameters::new(msg.id))
    .await?;

    for (i, shortcut) in shortcuts.iter().enumerate() {
        let label = bot
            .send_message(msg.chat.id, format!("{}. {}:", i + 1, shortcut.name))
            .await?;

        // A single bad item (corrupt payload, stale file id) is logged and
        // skipped; the rest of the listing still goes out.
        if let Err(e) = send_shortcut_content(bot, msg.chat.id, shortcut, Some(label.id)).await {
            warn!("Skipping shortcut {} ({:?}) in listing: {e}", shortcut.id, shortcut.name);
        }
    }
    Ok(())
}

async fn handle_delete(
    bot: &Bot,
    msg: &Message,
    user: &User,
    state: &BotState,
) -> Result<(), BotError> {
    let shortcuts = state.db.get_shortcuts(user.id.0 as i64)?;
    if shortcuts.is_empty() {
        bot.send_message(msg.chat.id, NO_SHORTCUTS_MESSAGE)
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }

    let names: Vec<String> = shortcuts.into_iter().map(|s| s.name).collect();
    bot.send_message(msg.chat.id, "Which shortcut do you want to delete?")
        .reply_markup(delete_keyboard(&names))
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;

    state
        .conversations
        .lock()
        .await
        .insert(msg.chat.id, Conversation::AwaitingDeleteSelection);
    Ok(())
}

async fn handle_delete_selection(
    bot: &Bot,
    msg: &Message,
    user: &User,
    state: &BotState,
) -> Result<(), BotError> {
    // The flow does not re-arm: whatever comes in, the state entry is gone.
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, USE_KEYBOARD_MESSAGE)
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    };

    if text == CANCEL_LABEL {
        bot.send_message(msg.chat.id, "Okay, nothing was deleted.")
            .reply_markup(KeyboardRemove::new())
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }

    let name = strip_quoted(text);
    match state.db.get_shortcut(user.id.0 as i64, name)? {
        Some(shortcut) => {
            state.db.delete_shortcut(shortcut.id)?;
            info!("User {} deleted shortcut {:?}", user.id, shortcut.name);
            bot.send_message(
                msg.chat.id,
                format!("Shortcut \"{}\" was successfully deleted!", shortcut.name),
            )
            .reply_markup(KeyboardRemove::new())
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, USE_KEYBOARD_MESSAGE)
                .reply_parameters(ReplyParameters::new(msg.id))
                .await?;
        }
    }
    Ok(())
}

async fn handle_get_users(
    bot: &Bot,
    msg: &Message,
    user: &User,
    state: &BotState,
) -> Result<(), BotError> {
    // A None report means the caller is not an admin; stay silent so
    // non-admins get no hint this command exists.
    if let Some(report) = build_users_report(&state.db, user.id.0 as i64)? {
        bot.send_message(msg.chat.id, report)
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: i64, username: Option<&str>, count: i64, tag: Option<&str>) -> UserSummary {
        UserSummary {
            telegram_id: id,
            username: username.map(str::to_string),
            registration_dt: "2024-03-01 12:00:00".to_string(),
            shortcut_count: count,
            start_param: tag.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_command_plain() {
        assert_eq!(parse_command("/help"), Some(("help", None)));
        assert_eq!(parse_command("/get_users"), Some(("get_users", None)));
    }

    #[test]
    fn test_parse_command_with_argument() {
        assert_eq!(parse_command("/start campaign1"), Some(("start", Some("campaign1"))));
        assert_eq!(parse_command("/start   spaced  "), Some(("start", Some("spaced"))));
    }

    #[test]
    fn test_parse_command_strips_bot_suffix() {
        assert_eq!(parse_command("/list@shortcut_holder_bot"), Some(("list", None)));
    }

    #[test]
    fn test_parse_command_rejects_non_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_delete_keyboard_two_per_row_plus_cancel() {
        let names = vec!["cv".to_string(), "card".to_string(), "loc1".to_string()];
        let kb = delete_keyboard(&names);

        assert_eq!(kb.keyboard.len(), 3);
        assert_eq!(kb.keyboard[0][0].text, "\"cv\"");
        assert_eq!(kb.keyboard[0][1].text, "\"card\"");
        assert_eq!(kb.keyboard[1][0].text, "\"loc1\"");
        assert_eq!(kb.keyboard[2][0].text, CANCEL_LABEL);
    }

    #[test]
    fn test_strip_quoted() {
        assert_eq!(strip_quoted("\"cv\""), "cv");
        assert_eq!(strip_quoted("cv"), "cv");
        // A shortcut literally named Cancel stays distinguishable from the button.
        assert_eq!(strip_quoted("\"Cancel\""), "Cancel");
        assert_eq!(strip_quoted("\"unbalanced"), "\"unbalanced");
    }

    #[test]
    fn test_start_reply_registers_then_helps() {
        let db = Database::new();

        let first = start_reply(&db, 100, Some("alice"), "Alice", Some("campaign1")).unwrap();
        match first {
            StartReply::Welcome(text) => assert!(text.contains("Hi, Alice!")),
            other => panic!("expected welcome, got {other:?}"),
        }
        let stored = db.get_user(100).unwrap().expect("user should be registered");
        assert_eq!(stored.start_param.as_deref(), Some("campaign1"));

        // Second contact keeps the original row and answers with help only.
        let second = start_reply(&db, 100, Some("alice"), "Alice", Some("campaign2")).unwrap();
        assert!(matches!(second, StartReply::Help));
        let stored = db.get_user(100).unwrap().unwrap();
        assert_eq!(stored.start_param.as_deref(), Some("campaign1"));
    }

    #[test]
    fn test_users_report_is_none_for_non_admin() {
        let db = Database::new();
        db.create_user(100, Some("alice"), None).unwrap();

        assert!(build_users_report(&db, 100).unwrap().is_none());
    }

    #[test]
    fn test_users_report_for_admin() {
        let db = Database::new();
        db.create_user(100, Some("alice"), None).unwrap();
        db.create_user(200, Some("bob"), None).unwrap();
        db.add_admin(200).unwrap();

        let report = build_users_report(&db, 200).unwrap().expect("admin should get a report");
        assert!(report.starts_with("2 user(s):"));
        assert!(report.contains("100 (alice)"));
    }

    #[test]
    fn test_users_report_includes_zero_shortcut_users() {
        let report = format_users_report(&[
            summary(100, Some("alice"), 2, Some("campaign1")),
            summary(200, None, 0, None),
        ]);

        assert!(report.starts_with("2 user(s):"));
        assert!(report.contains("100 (alice) registered 2024-03-01 12:00:00, 2 shortcut(s), tag: campaign1"));
        assert!(report.contains("200 (-) registered 2024-03-01 12:00:00, 0 shortcut(s), tag: -"));
    }
}

mod bot;
mod config;

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::prelude::*;

use bot::database::Database;
use bot::{BotState, commands, inline};
use config::Config;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging: stdout plus a non-blocking file appender
    std::fs::create_dir_all(&config.log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("shortcut-holder.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting shortcut-holder...");

    let bot = Bot::new(&config.bot_token);
    let db = Database::open(&config.database_path).expect("Failed to open database");
    let state = Arc::new(BotState::new(db));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(commands::handle_message))
        .branch(Update::filter_inline_query().endpoint(inline::handle_inline_query))
        .branch(Update::filter_chosen_inline_result().endpoint(inline::handle_chosen_inline_result));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

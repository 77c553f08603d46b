mod config;
mod error;
mod handler;
mod server;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ENV_BOT_TOKEN, ENV_CHAT_ID};
use crate::server::AppState;
use crate::telegram::TelegramNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tg_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // An explicit path must exist; the default one is optional.
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            let path = PathBuf::from("config.toml");
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    }
    .with_env(|key| std::env::var(key).ok());

    if config.telegram.bot_token.is_none() {
        warn!("{} is not set; messages cannot be delivered", ENV_BOT_TOKEN);
    }
    if config.telegram.chat_id.is_none() {
        warn!("{} is not set; every chat will be treated as unauthorized", ENV_CHAT_ID);
    }

    info!("Configuration loaded successfully");
    info!("  Telegram API: {}", config.telegram.api_base_url);
    info!("  Allowed chat: {:?}", config.telegram.chat_id);

    let notifier = Arc::new(TelegramNotifier::new(&config.telegram));
    let bind_address = config.server.bind_address;
    let state = AppState::new(config, notifier);

    info!("Relay is starting...");
    server::serve(state, bind_address).await?;

    Ok(())
}

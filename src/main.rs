mod config;
mod journal;
mod llm;
mod platform;
mod relay;
mod sanitize;

use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::journal::Journal;
use crate::llm::LlmClient;
use crate::relay::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seerborn=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    // Secrets are checked before anything touches the network
    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.llm.model);
    info!("  Endpoint: {}", config.llm.base_url);
    match &config.log_file {
        Some(path) => info!("  Log file: {}", path.display()),
        None => info!("  Log file: disabled"),
    }

    let llm = LlmClient::new(config.llm.clone())?;
    let mut relay = Relay::new(Arc::new(llm), config.llm.system_prompt.clone());
    if let Some(path) = &config.log_file {
        relay = relay.with_journal(Journal::new(path));
    }

    let bot = Bot::new(&config.bot_token);

    info!("SeerbornBot is starting...");
    platform::telegram::run(Arc::new(relay), bot).await?;

    Ok(())
}

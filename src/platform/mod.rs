pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::relay::{error_notice, Relay};

pub const GREETING: &str = "🔮 Привет, я SeerbornBot. Готов заглянуть за грань?";

/// A message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform identifier (e.g., "telegram")
    pub platform: String,
    /// Platform-specific user ID as string
    pub user_id: String,
    /// Platform-specific chat ID as string
    pub chat_id: String,
    /// Display name of the user
    pub user_name: String,
    /// The message text, absent for stickers, photos and the like
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Greeting,
    Relay,
    Ignore,
}

/// Decide who answers a message. `/start` (also `/start@Bot` and
/// `/start payload`) gets the greeting, other commands are ignored, and
/// everything else, non-text included, goes to the relay.
pub fn route(text: Option<&str>) -> Route {
    let Some(text) = text else {
        return Route::Relay;
    };
    let Some(command) = text.trim_start().strip_prefix('/') else {
        return Route::Relay;
    };

    let name = command
        .split_whitespace()
        .next()
        .and_then(|word| word.split('@').next())
        .unwrap_or("");

    if name.eq_ignore_ascii_case("start") {
        Route::Greeting
    } else {
        Route::Ignore
    }
}

/// The reply for a message, or `None` when the bot stays silent.
pub async fn respond(relay: &Relay, incoming: &IncomingMessage) -> Option<String> {
    match route(incoming.text.as_deref()) {
        Route::Greeting => Some(GREETING.to_string()),
        Route::Ignore => {
            debug!("Ignoring unknown command from {}", incoming.user_id);
            None
        }
        Route::Relay => {
            let exchange = relay.handle(incoming).await;
            debug!(outcome = ?exchange.outcome, incoming = ?exchange.incoming_text, "Exchange complete");
            Some(exchange.reply_text)
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid chat id: {0}")]
    InvalidChat(String),

    #[error("platform rejected the message: {0}")]
    Platform(String),
}

/// Outbound side of a chat platform.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Send `reply`; if that fails, make a single attempt to tell the user what
/// went wrong, then give up quietly. Returns whether the reply got through.
pub async fn deliver(outbox: &dyn Outbox, chat_id: &str, reply: &str) -> bool {
    match outbox.send_text(chat_id, reply).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to deliver reply to {}: {}", chat_id, e);
            let notice = error_notice(&e);
            if let Err(e) = outbox.send_text(chat_id, &notice).await {
                warn!("Error notice to {} was not delivered either: {}", chat_id, e);
            }
            false
        }
    }
}

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageKind};
use tracing::{debug, info, warn};

use crate::platform::{deliver, respond, route, DeliveryError, IncomingMessage, Outbox, Route};
use crate::relay::Relay;

/// Sends replies through the Bot API.
pub struct TelegramOutbox {
    bot: Bot,
}

impl TelegramOutbox {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbox for TelegramOutbox {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let id: i64 = chat_id
            .parse()
            .map_err(|_| DeliveryError::InvalidChat(chat_id.to_string()))?;
        self.bot
            .send_message(ChatId(id), text)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError::Platform(e.to_string()))
    }
}

/// Run the Telegram polling loop until the process is interrupted
pub async fn run(relay: Arc<Relay>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Telegram platform stopped");
    Ok(())
}

fn incoming_from(msg: &Message) -> IncomingMessage {
    let (user_id, user_name) = match msg.from.as_ref() {
        Some(user) => (user.id.0.to_string(), user.first_name.clone()),
        None => ("unknown".to_string(), "unknown".to_string()),
    };

    IncomingMessage {
        platform: "telegram".to_string(),
        user_id,
        chat_id: msg.chat.id.0.to_string(),
        user_name,
        text: msg.text().map(str::to_string),
    }
}

async fn handle_message(bot: Bot, msg: Message, relay: Arc<Relay>) -> ResponseResult<()> {
    // Service messages (joins, pins, ...) are not addressed to the bot
    if !matches!(msg.kind, MessageKind::Common(_)) {
        debug!("Skipping service message in chat {}", msg.chat.id);
        return Ok(());
    }

    let incoming = incoming_from(&msg);

    if incoming.text.is_some() && route(incoming.text.as_deref()) == Route::Relay {
        bot.send_chat_action(msg.chat.id, ChatAction::Typing)
            .await
            .ok();
    }

    if let Some(reply) = respond(&relay, &incoming).await {
        let outbox = TelegramOutbox::new(bot);
        deliver(&outbox, &incoming.chat_id, &reply).await;
    }

    Ok(())
}

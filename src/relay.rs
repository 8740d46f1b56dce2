use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::journal::Journal;
use crate::llm::{ChatMessage, CompletionProvider, ProviderError};
use crate::platform::IncomingMessage;
use crate::sanitize;

/// Longest reply ever sent, in characters. Telegram caps messages at 4096.
pub const MAX_REPLY_CHARS: usize = 4000;

pub const TEXT_ONLY_NOTICE: &str = "🔮 Я понимаю только текстовые сообщения.";

pub const ERROR_NOTICE_PREFIX: &str = "⚠️ Ошибка: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Answered,
    Truncated,
    NonText,
    ProviderFailed,
}

/// One inbound message and the reply produced for it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub incoming_text: Option<String>,
    pub reply_text: String,
    pub outcome: Outcome,
}

/// Short user-facing notice for a failed exchange, bounded like any reply.
pub fn error_notice(err: &dyn Display) -> String {
    let notice = format!("{}{}", ERROR_NOTICE_PREFIX, err);
    sanitize::truncate_with_ellipsis(&notice, MAX_REPLY_CHARS).0
}

/// Turns an incoming chat message into a reply via the completion provider.
/// Holds no per-user state; any transport can drive it.
pub struct Relay {
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    journal: Option<Journal>,
}

impl Relay {
    pub fn new(provider: Arc<dyn CompletionProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Produce the reply for one message. Never fails: every error path
    /// ends in a notice the user can read.
    pub async fn handle(&self, incoming: &IncomingMessage) -> Exchange {
        let span = info_span!(
            "exchange",
            id = %Uuid::new_v4(),
            platform = %incoming.platform,
            chat = %incoming.chat_id,
        );
        self.handle_inner(incoming).instrument(span).await
    }

    async fn handle_inner(&self, incoming: &IncomingMessage) -> Exchange {
        let text = match incoming.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => {
                debug!("Message from {} carries no text", incoming.user_id);
                return Exchange {
                    incoming_text: incoming.text.clone(),
                    reply_text: TEXT_ONLY_NOTICE.to_string(),
                    outcome: Outcome::NonText,
                };
            }
        };

        info!("Message from {} ({}): {}", incoming.user_name, incoming.user_id, text);
        self.record(format!("<- {} ({}): {}", incoming.user_name, incoming.user_id, text))
            .await;

        let (reply_text, outcome) = match self.complete(text).await {
            Ok(completion) => {
                let (reply, truncated) =
                    sanitize::truncate_with_ellipsis(&completion, MAX_REPLY_CHARS);
                if truncated {
                    info!(
                        "Completion truncated from {} chars",
                        completion.chars().count()
                    );
                    (reply, Outcome::Truncated)
                } else {
                    (reply, Outcome::Answered)
                }
            }
            Err(e) => {
                error!(retryable = e.is_retryable(), "Completion failed: {}", e);
                self.record(format!("!! {}: {}", incoming.user_name, e)).await;
                (error_notice(&e), Outcome::ProviderFailed)
            }
        };

        if outcome != Outcome::ProviderFailed {
            self.record(format!("-> {}: {}", incoming.user_name, reply_text))
                .await;
        }

        Exchange {
            incoming_text: Some(text.to_string()),
            reply_text,
            outcome,
        }
    }

    fn build_prompt(&self, text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ]
    }

    async fn complete(&self, text: &str) -> Result<String, ProviderError> {
        let raw = self.provider.complete(&self.build_prompt(text)).await?;
        let cleaned = sanitize::scrub(&raw);
        if cleaned.is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(cleaned)
    }

    async fn record(&self, line: String) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&line).await {
                warn!("Failed to write log file {}: {}", journal.path().display(), e);
            }
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const BOT_TOKEN_VAR: &str = "BOT_TOKEN";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const LOG_FILE_VAR: &str = "SEERBORN_LOG_FILE";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set (add it to the environment or .env)")]
    MissingSecret(&'static str),
}

#[derive(Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub system_prompt: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub llm: LlmConfig,
    /// Append-only log of every exchange, when set.
    pub log_file: Option<PathBuf>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("llm", &self.llm)
            .field("log_file", &self.log_file)
            .finish()
    }
}

fn default_system_prompt() -> String {
    "Ты мистический, умный и немного саркастичный ИИ по имени Seerborn. \
     Отвечай кратко, с атмосферой тайн и иронии."
        .to_string()
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    /// Empty or whitespace-only secrets count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = non_empty(BOT_TOKEN_VAR).ok_or(ConfigError::MissingSecret(BOT_TOKEN_VAR))?;
        let api_key = non_empty(API_KEY_VAR).ok_or(ConfigError::MissingSecret(API_KEY_VAR))?;

        let base_url = non_empty(BASE_URL_VAR)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            bot_token,
            llm: LlmConfig {
                model: DEFAULT_MODEL.to_string(),
                base_url,
                api_key,
                system_prompt: default_system_prompt(),
                timeout: DEFAULT_TIMEOUT,
            },
            log_file: non_empty(LOG_FILE_VAR).map(PathBuf::from),
        })
    }
}

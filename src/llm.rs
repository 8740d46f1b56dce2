use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;
use crate::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("completion request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to reach the completion API: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("completion API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("failed to parse completion response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("completion API returned no text")]
    EmptyCompletion,
}

impl ProviderError {
    /// Whether the same request could succeed if sent again later.
    /// Nothing retries automatically; this only feeds the logs.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_) | ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderError::Decode(_) | ProviderError::EmptyCompletion => false,
        }
    }
}

/// Anything that turns a prompt into completion text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Pull the human-readable message out of an OpenAI-style error body,
/// falling back to the raw body or the status reason.
fn api_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        if !parsed.error.message.trim().is_empty() {
            return parsed.error.message;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("no details").to_string()
    } else {
        body.to_string()
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn classify(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.config.timeout)
        } else {
            ProviderError::Transport(err)
        }
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        debug!("Sending request to completion API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let raw = response.bytes().await.map_err(|e| self.classify(e))?;
        let body = sanitize::decode_dropping_invalid(&raw);

        if !status.is_success() {
            return Err(ProviderError::Api {
                status,
                message: api_error_message(status, &body),
            });
        }

        let body = sanitize::strip_lone_surrogate_escapes(&body);
        let chat_response: ChatResponse = serde_json::from_str(&body)?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{header, HeaderMap};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Option<(Option<String>, Value)>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: String, timeout: Duration) -> LlmClient {
        LlmClient::new(LlmConfig {
            model: "gpt-3.5-turbo".to_string(),
            base_url,
            api_key: "sk-test".to_string(),
            system_prompt: String::new(),
            timeout,
        })
        .unwrap()
    }

    fn prompt() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Отвечай кратко."),
            ChatMessage::user("Кто ты?"),
        ]
    }

    async fn capture(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *seen.lock().unwrap() = Some((auth, body));
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Я — страж тайн.  " } }]
        }))
    }

    #[tokio::test]
    async fn test_request_shape_and_reply() {
        let seen: Seen = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route("/chat/completions", post(capture))
            .with_state(seen.clone());
        let client = client_for(serve(router).await, Duration::from_secs(5));

        let reply = client.complete(&prompt()).await.unwrap();
        assert_eq!(reply, "  Я — страж тайн.  ");

        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Кто ты?");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_bytes_and_lone_surrogates_dropped() {
        let mut body = br#"{"choices":[{"message":{"role":"assistant","content":"ok"#.to_vec();
        body.extend_from_slice(&[0xF4, 0x90, 0x80, 0x80, 0xFF]);
        body.extend_from_slice(br#"\ud800!"}}]}"#);

        let router = Router::new().route(
            "/chat/completions",
            post(move || {
                let body = body.clone();
                async move { ([(header::CONTENT_TYPE, "application/json")], body) }
            }),
        );
        let client = client_for(serve(router).await, Duration::from_secs(5));

        let reply = client.complete(&prompt()).await.unwrap();
        assert_eq!(reply, "ok!");
    }

    #[tokio::test]
    async fn test_api_error_message_extracted() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": { "message": "Rate limit reached", "type": "requests" } })),
                )
            }),
        );
        let client = client_for(serve(router).await, Duration::from_secs(5));

        let err = client.complete(&prompt()).await.unwrap_err();
        match &err {
            ProviderError::Api { status, message } => {
                assert_eq!(*status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retryable() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "invalid api key") }),
        );
        let client = client_for(serve(router).await, Duration::from_secs(5));

        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(
            &err,
            ProviderError::Api { message, .. } if message == "invalid api key"
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "choices": [] }))
            }),
        );
        let client = client_for(serve(router).await, Duration::from_millis(200));

        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_content_is_empty_completion() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(json!({ "choices": [{ "message": { "role": "assistant", "content": null } }] }))
            }),
        );
        let client = client_for(serve(router).await, Duration::from_secs(5));

        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyCompletion));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{}", addr), Duration::from_secs(5));
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_api_error_message_fallbacks() {
        assert_eq!(
            api_error_message(StatusCode::BAD_GATEWAY, "  "),
            "Bad Gateway"
        );
        assert_eq!(
            api_error_message(StatusCode::BAD_REQUEST, r#"{"error":{"message":"bad model"}}"#),
            "bad model"
        );
    }
}

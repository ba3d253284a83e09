use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::models::internal::{Message, MessageRole};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum LlmBridgeError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Stateless text completion: system prompt plus ordered history in, one
/// reply out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, history: &[Message]) -> Result<String, LlmBridgeError>;
}

#[derive(Clone)]
pub struct LlmBridgeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

// No Debug: the struct holds the provider credential.

impl LlmBridgeClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, LlmBridgeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens,
            timeout,
        })
    }

    /// `Ok(None)` when no credential is configured; the coach is then
    /// reported as unavailable rather than failing at startup.
    pub fn from_config(config: &Config) -> Result<Option<Self>, LlmBridgeError> {
        let Some(api_key) = config.llm_api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        Self::new(
            config.llm_base_url.clone(),
            api_key,
            config.llm_model.clone(),
            config.llm_max_tokens,
            Duration::from_secs(config.llm_timeout_secs),
        )
        .map(Some)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_request(&self, system: &str, history: &[Message]) -> CompletionRequest {
        // The provider requires the first turn to come from the user.
        let messages = history
            .iter()
            .skip_while(|m| m.role == MessageRole::Assistant)
            .map(|m| ChatTurn {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        CompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages,
        }
    }
}

#[async_trait]
impl CompletionProvider for LlmBridgeClient {
    async fn complete(&self, system: &str, history: &[Message]) -> Result<String, LlmBridgeError> {
        let request = self.to_request(system, history);
        if request.messages.is_empty() {
            return Err(LlmBridgeError::InvalidResponse(
                "no user turn to respond to".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmBridgeError::Timeout(self.timeout)
                } else {
                    LlmBridgeError::HttpError(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmBridgeError::ApiError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmBridgeError::Timeout(self.timeout)
            } else {
                LlmBridgeError::InvalidResponse(e.to_string())
            }
        })?;

        let text = completion
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let text = text.trim();
        if text.is_empty() {
            return Err(LlmBridgeError::InvalidResponse(
                "completion contained no text".to_string(),
            ));
        }

        Ok(text.to_string())
    }
}

// Request/Response Models
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
struct ChatTurn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

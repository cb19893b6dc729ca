//! Language model client.
//!
//! The orchestrator only needs one capability from a model: turn an ordered
//! list of role-tagged messages into a single completion. [`ChatModel`] is that
//! seam; [`ChatCompletionsClient`] implements it for OpenAI-compatible
//! `/chat/completions` APIs and defaults to Groq.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::models::ChatMessage;

#[derive(Debug, Error)]
pub enum LlmError {
    /// The client could not be constructed. Fatal to the session.
    #[error("failed to initialize language model: {0}")]
    Initialization(String),
    #[error("language model request failed: {0}")]
    Request(String),
    #[error("language model API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid language model response: {0}")]
    InvalidResponse(String),
    #[error("language model timed out after {0:?}")]
    Timeout(Duration),
}

/// A text-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Complete the conversation, returning the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct ChatCompletionsClient {
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Initialization("API key is empty".to_string()));
        }
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Initialization(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout,
            client,
        })
    }

    /// Build from config, reading the key from `GROQ_API_KEY`.
    pub fn from_env(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("GROQ_API_KEY").map_err(|_| {
            LlmError::Initialization("GROQ_API_KEY environment variable not set".to_string())
        })?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Request(format!("{} ({})", e, url))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

//! Conversational model abstraction.
//!
//! Defines the [`ChatModel`] trait and concrete implementations:
//! - **[`DisabledChat`]**: returns errors; used when `chat.provider = "disabled"`.
//! - **[`OpenAIChat`]**: calls the OpenAI chat completions API.
//!
//! # Retry Strategy
//!
//! The OpenAI model retries within its own attempt budget
//! (`chat.max_attempts`, default 3) using exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! Callers see a single success or a single [`Error::Conversation`].

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Role};

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4.1-mini"`).
    fn model_name(&self) -> &str;

    /// Run one conversation and return the model's reply.
    async fn run_conversation(&self, system: &str, messages: &[ChatMessage]) -> Result<String>;
}

// ============ Disabled Provider ============

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn run_conversation(&self, _system: &str, _messages: &[ChatMessage]) -> Result<String> {
        Err(Error::Conversation("chat provider is disabled".to_string()))
    }
}

// ============ OpenAI Provider ============

/// Chat model backed by `POST {base_url}/chat/completions`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_attempts: u32,
}

#[derive(Serialize)]
struct Payload<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::Conversation("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Conversation(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_attempts: config.max_attempts.max(1),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn run_conversation(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let system_message = ChatMessage {
            role: Role::System,
            content: system.to_string(),
        };
        let payload = Payload {
            model: &self.model,
            messages: std::iter::once(&system_message).chain(messages.iter()).collect(),
        };

        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::Conversation(format!("invalid response body: {}", e)))?;
                        return parse_chat_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, attempt, "chat completion failed, retrying");
                        last_err = Some(Error::Conversation(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429): fail now
                    return Err(Error::Conversation(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "chat completion request failed, retrying");
                    last_err = Some(Error::Conversation(format!("request failed: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Conversation("chat completion failed after retries".to_string())))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Conversation("invalid response: missing message content".to_string()))
}

/// Create the [`ChatModel`] named by `config.provider`.
pub fn create_chat(config: &ChatConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChat)),
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        other => Err(Error::Conversation(format!("unknown chat provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "It was the parser."}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "It was the parser.");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let json = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_chat_response(&json),
            Err(Error::Conversation(_))
        ));
    }

    #[test]
    fn test_payload_puts_system_first() {
        let system = ChatMessage {
            role: Role::System,
            content: "sys".to_string(),
        };
        let user = ChatMessage::user("hi");
        let payload = Payload {
            model: "m",
            messages: vec![&system, &user],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_disabled_chat_fails() {
        let err = DisabledChat.run_conversation("sys", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Conversation(_)));
    }
}

//! LLM access through an OpenAI-compatible HTTP API
//!
//! Groq, OpenAI, Together, vLLM and most local servers expose the same
//! `/chat/completions` and `/embeddings` endpoints, so one client covers them.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::{Error, Result};

/// A single-turn chat completion request
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text completion backend
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Return the assistant message text
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Text embedding backend
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for OpenAI-compatible endpoints
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    embedding_base_url: String,
    embedding_model: String,
    timeout: Duration,
}

impl OpenAiCompatClient {
    /// Create a client from configuration
    pub fn new(config: &LlmConfig, api_key: impl Into<String>, timeout: Duration) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let embedding_base_url = config
            .embedding_base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| base_url.clone());

        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            embedding_base_url,
            embedding_model: config.embedding_model.clone(),
            timeout,
        }
    }

    /// Chat model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("User-Agent", format!("revloop/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: format!("POST {}", url),
                        limit: self.timeout,
                    }
                } else {
                    Error::Llm(format!("Request to {} failed: {}", url, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(Error::Llm(format!(
                "{} returned HTTP {}: {}",
                url, status, text
            )));
        }

        Ok(response)
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.user,
        });

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        });

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, prompt_chars = request.user.len(), "Sending chat completion");

        let parsed: ChatCompletionResponse = self
            .post_json(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Llm("Completion response contained no message".to_string()))
    }
}

#[async_trait]
impl Embedder for OpenAiCompatClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": [text],
        });

        let url = format!("{}/embeddings", self.embedding_base_url);
        let parsed: EmbeddingResponse = self
            .post_json(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse embedding response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Llm("Embedding response contained no vectors".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = LlmConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        };
        let client = OpenAiCompatClient::new(&config, "key", Duration::from_secs(5));
        assert_eq!(client.base_url, "https://api.example.com/v1");
        assert_eq!(client.embedding_base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_separate_embedding_endpoint() {
        let config = LlmConfig {
            embedding_base_url: Some("https://embed.example.com/v1".to_string()),
            ..Default::default()
        };
        let client = OpenAiCompatClient::new(&config, "key", Duration::from_secs(5));
        assert_eq!(client.embedding_base_url, "https://embed.example.com/v1");
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_parse_completion_response() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"LGTM"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("LGTM"));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = OpenAiCompatClient::new(&LlmConfig::default(), "secret-key", Duration::from_secs(5));
        assert!(!format!("{:?}", client).contains("secret-key"));
    }

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new("review this")
            .with_system("You are a reviewer")
            .with_temperature(0.1);
        assert_eq!(request.system.as_deref(), Some("You are a reviewer"));
        assert_eq!(request.temperature, Some(0.1));
        assert!(request.max_tokens.is_none());
    }
}

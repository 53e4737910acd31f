//! LLM client
//!
//! The core sees exactly one operation: `complete(prompt) → text`. The
//! HTTP backend speaks the Ollama chat API with decoding parameters fixed
//! at construction; there is no streaming or tool calling on this surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::LlmError;

/// Connection and decoding settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// API endpoint, e.g. `http://localhost:11434`.
    pub endpoint: String,
    /// Model name/ID.
    pub model: String,
    /// Low temperature keeps the tabular output stable.
    pub temperature: f32,
    /// Bounded output length.
    pub max_tokens: usize,
    /// Transport timeout for one call.
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "deepseek-r1:7b".to_string(),
            temperature: 0.1,
            max_tokens: 1536,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Single-call completion client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Blocking single-shot completion. Fails with `Unavailable` on
    /// transport errors, `Timeout` on deadline, `Empty` on a blank reply.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// HTTP backend over the Ollama chat API.
pub struct HttpLlmClient {
    client: Client,
    settings: LlmSettings,
}

impl HttpLlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("http client: {}", e)))?;
        Ok(Self { client, settings })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.settings.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: ChatOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens as i32,
            },
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(format!("invalid response body: {}", e)))?;

        let text = reply.message.content;
        tracing::debug!(
            latency_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "llm call returned"
        );
        if text.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

//! Client for the local inference engine (Ollama HTTP API).
//!
//! Only non-streaming chat completion and the model listings are used.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::chat::ChatMessage;
use serde::{Deserialize, Serialize};

/// Errors from the inference engine layer.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed (connection refused, DNS, TLS, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Inference API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

/// Chat completion seam used by the agent runtime.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run `messages` through `model` and return the assistant's text.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InferenceError>;
}

/// Model listing seam used by the heartbeat.
#[async_trait]
pub trait ModelInventory: Send + Sync {
    /// Model currently loaded in memory, if any.
    async fn active_model(&self) -> Result<Option<String>, InferenceError>;
    /// Installed models in the engine's listing order.
    async fn installed_models(&self) -> Result<Vec<String>, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Body of `/api/ps` and `/api/tags`.
#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

/// HTTP client for one Ollama instance.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client for `base_url`, e.g. `http://localhost:11434`.
    ///
    /// `timeout` bounds every request, including chat completions.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InferenceError::Request)?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn map_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(self.timeout)
        } else if e.is_decode() {
            InferenceError::MalformedResponse(e.to_string())
        } else {
            InferenceError::Request(e)
        }
    }

    /// Ensure the response has a success status code, otherwise capture
    /// the status and body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, InferenceError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(|e| self.map_error(e))
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InferenceError> {
        let body = ChatRequest {
            model,
            messages,
            stream: false,
        };
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let response = Self::ensure_success(response).await?;
        let parsed: ChatResponse = response.json().await.map_err(|e| self.map_error(e))?;

        parsed
            .message
            .map(|message| message.content)
            .ok_or_else(|| InferenceError::MalformedResponse("response has no message".to_string()))
    }
}

#[async_trait]
impl ModelInventory for OllamaClient {
    async fn active_model(&self) -> Result<Option<String>, InferenceError> {
        let running: ModelList = self.get_json("/api/ps").await?;
        Ok(running.models.into_iter().next().map(|entry| entry.name))
    }

    async fn installed_models(&self) -> Result<Vec<String>, InferenceError> {
        let installed: ModelList = self.get_json("/api/tags").await?;
        Ok(installed.models.into_iter().map(|entry| entry.name).collect())
    }
}

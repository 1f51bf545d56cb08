//! Chat-completion client.
//!
//! [`CompletionBackend`] is the seam between the pipeline and the network.
//! [`OpenAiClient`] is the production backend: one `POST` per call with a
//! bearer credential, no retries, no streaming.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, Credential};
use crate::conversation::ChatMessage;
use crate::error::CompletionError;

/// Body of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// System prompt followed by the transcript.
    pub messages: Vec<ChatMessage>,
}

/// Something that can turn a request into reply text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends `request` and returns the reply text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl CompletionResponse {
    fn into_reply(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
    }
}

/// HTTP backend for `OpenAI`-compatible chat-completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    credential: Credential,
}

impl OpenAiClient {
    /// Creates a client for `endpoint` using `credential`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, credential: Credential) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            credential,
        }
    }

    /// Creates a client from configuration.
    ///
    /// Returns `None` when no usable credential is configured, which is the
    /// offline case.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .credential()
            .map(|credential| Self::new(&config.endpoint, credential.clone()))
    }

    /// The endpoint this client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.credential.expose())
            .json(request)
            .send()
            .await
            .map_err(CompletionError::network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::http(status.as_u16(), body));
        }

        // A 2xx body we cannot decode carries no usable reply
        let body: CompletionResponse = response.json().await.map_err(|e| {
            debug!(error = %e, "Completion body did not decode");
            CompletionError::ContentMissing
        })?;
        body.into_reply().ok_or(CompletionError::ContentMissing)
    }
}

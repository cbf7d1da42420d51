//! Text-generation client abstraction.
//!
//! The pipeline only needs "prompt in, text out"; [`OpenAiCompatibleGenerator`]
//! speaks the widely implemented `/chat/completions` dialect so any compatible
//! provider or local server can be configured.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service rate limited")]
    RateLimited,

    #[error("generation service returned HTTP {0}")]
    Server(u16),

    #[error("generation service rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("generation request rejected: {0}")]
    BadRequest(String),

    #[error("generation request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("generation transport error: {0}")]
    Transport(String),

    #[error("unparseable generation output: {0}")]
    Malformed(String),

    #[error("generation service returned no content")]
    Empty,
}

impl GenerationError {
    /// Rate limits, server errors, transport hiccups and unusable output are
    /// worth another attempt. Credential and request errors will not change,
    /// and a timeout would recur under the same budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::RateLimited
            | GenerationError::Server(_)
            | GenerationError::Transport(_)
            | GenerationError::Malformed(_)
            | GenerationError::Empty => true,
            GenerationError::Unauthorized(_)
            | GenerationError::BadRequest(_)
            | GenerationError::Timeout(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .user_agent(concat!("morgue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn send(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("response envelope: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::Empty)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        match tokio::time::timeout(request.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(request.timeout)),
        }
    }
}

fn classify_transport(err: reqwest::Error) -> GenerationError {
    GenerationError::Transport(err.to_string())
}

fn classify_status(status: StatusCode, detail: String) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GenerationError::Unauthorized(status.as_u16())
        }
        s if s.is_server_error() => GenerationError::Server(s.as_u16()),
        s => GenerationError::BadRequest(format!(
            "HTTP {}: {}",
            s.as_u16(),
            morgue_model::truncate_reason(&detail, 200)
        )),
    }
}

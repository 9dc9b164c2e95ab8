//! Local GPU inference service provider.
//!
//! Implements the [`ProviderClient`] trait for a self-hosted,
//! GPU-accelerated inference service that speaks the OpenAI chat-completions
//! wire format and exposes a dedicated `/health` endpoint. Typically the
//! fastest candidate in a race when the machine has a warm model loaded.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;

use super::provider::{LlmError, ProviderClient};
use super::types::*;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Local inference service provider.
pub struct LocalProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl LocalProvider {
    /// Create a provider pointed at the default local service address.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a provider pointed at a specific service address.
    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: url.into().trim_end_matches('/').to_string(),
            default_model: "default".to_string(),
        }
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    fn build_request_body(&self, request: &ChatRequest) -> LocalChatRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        LocalChatRequest {
            model,
            messages: request
                .messages
                .iter()
                .map(|m| LocalMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: false,
        }
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderClient for LocalProvider {
    fn name(&self) -> &str {
        "Local"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn chat_completion(
        &self,
        request: &ChatRequest,
    ) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let body = self.build_request_body(request);
        Box::pin(async move {
            debug!(model = %body.model, url = %self.base_url, "local chat request");

            let resp = self
                .client
                .post(self.chat_url())
                .json(&body)
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            if !resp.status().is_success() {
                let error_body = resp.text().await.unwrap_or_default();
                return Err(LlmError::ProviderError {
                    status,
                    message: error_body,
                });
            }

            let api_resp: LocalChatResponse = resp
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;

            let choice = api_resp
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::Parse("response contained no choices".to_string()))?;

            let usage = api_resp.usage.unwrap_or_default();
            Ok(ChatResponse {
                content: choice.message.content,
                model: api_resp.model,
                provider: Some(ProviderKind::Local),
                usage: TokenUsage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                },
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<bool, LlmError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(self.health_url())
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;
            Ok(resp.status().is_success())
        })
    }
}

// ── Local service wire types (private, OpenAI-compatible subset) ────────

#[derive(Debug, Serialize)]
struct LocalChatRequest {
    model: String,
    messages: Vec<LocalMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct LocalChatResponse {
    model: String,
    choices: Vec<LocalChoice>,
    usage: Option<LocalUsage>,
}

#[derive(Debug, Deserialize)]
struct LocalChoice {
    message: LocalMessage,
}

#[derive(Debug, Default, Deserialize)]
struct LocalUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

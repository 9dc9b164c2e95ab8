//! Anthropic Claude API provider.
//!
//! Implements the [`ProviderClient`] trait for the Anthropic Messages API
//! via the `/v1/messages` endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;

use super::provider::{LlmError, ProviderClient};
use super::types::*;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    default_model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            default_model: "claude-sonnet-4-20250514".to_string(),
        }
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Convert our ChatRequest into Anthropic's API format.
    fn build_request_body(&self, request: &ChatRequest) -> AnthropicRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        // System messages go in the dedicated system field, first one wins
        let system = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| AnthropicMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: Some(request.temperature),
            top_p: Some(request.top_p),
        }
    }

    /// Parse Anthropic's response into our ChatResponse.
    fn parse_response(&self, resp: AnthropicResponse) -> ChatResponse {
        let content = resp
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicBlock::Text { text } => Some(text.as_str()),
            })
            .collect::<Vec<_>>()
            .join("");

        ChatResponse {
            content,
            model: resp.model,
            provider: Some(ProviderKind::Anthropic),
            usage: TokenUsage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            },
        }
    }
}

impl ProviderClient for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
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
            debug!(model = %body.model, "Anthropic chat request");

            let resp = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            if status == 401 {
                return Err(LlmError::Auth("invalid API key".to_string()));
            }
            if status == 429 {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                return Err(LlmError::RateLimited {
                    retry_after_secs: retry_after,
                });
            }
            if !resp.status().is_success() {
                let error_body = resp.text().await.unwrap_or_default();
                return Err(LlmError::ProviderError {
                    status,
                    message: error_body,
                });
            }

            let api_resp: AnthropicResponse = resp
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;

            Ok(self.parse_response(api_resp))
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<bool, LlmError>> {
        // The Messages API has no ping endpoint; a minimal completion
        // doubles as the probe.
        let probe = ChatRequest {
            messages: vec![ChatMessage::user("ping")],
            max_tokens: 1,
            ..Default::default()
        };
        Box::pin(async move { Ok(self.chat_completion(&probe).await.is_ok()) })
    }
}

// ── Anthropic API types (private) ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_request() {
        let provider = AnthropicProvider::new("test-key");
        let request = ChatRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![
                ChatMessage::system("You are a helpful assistant."),
                ChatMessage::user("Hello!"),
            ],
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.9,
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body.model, "claude-sonnet-4-20250514");
        assert_eq!(body.max_tokens, 1024);
        assert_eq!(body.system.as_deref(), Some("You are a helpful assistant."));
        // System message is extracted, so only user message remains
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.top_p, Some(0.9));
    }

    #[test]
    fn test_parse_text_response() {
        let provider = AnthropicProvider::new("test-key");
        let api_resp = AnthropicResponse {
            model: "claude-sonnet-4-20250514".to_string(),
            content: vec![AnthropicBlock::Text {
                text: "Hello! How can I help?".to_string(),
            }],
            usage: AnthropicUsage {
                input_tokens: 10,
                output_tokens: 8,
            },
        };

        let resp = provider.parse_response(api_resp);
        assert_eq!(resp.content, "Hello! How can I help?");
        assert_eq!(resp.provider, Some(ProviderKind::Anthropic));
        assert_eq!(resp.usage.prompt_tokens, 10);
        assert_eq!(resp.usage.completion_tokens, 8);
        assert_eq!(resp.usage.total_tokens, 18);
    }

    #[test]
    fn test_multi_block_response_concatenates() {
        let provider = AnthropicProvider::new("test-key");
        let api_resp = AnthropicResponse {
            model: "claude-sonnet-4-20250514".to_string(),
            content: vec![
                AnthropicBlock::Text {
                    text: "part one ".to_string(),
                },
                AnthropicBlock::Text {
                    text: "part two".to_string(),
                },
            ],
            usage: AnthropicUsage {
                input_tokens: 1,
                output_tokens: 2,
            },
        };
        let resp = provider.parse_response(api_resp);
        assert_eq!(resp.content, "part one part two");
    }

    #[test]
    fn test_default_model() {
        let provider = AnthropicProvider::new("test-key");
        let request = ChatRequest::user("hi");
        let body = provider.build_request_body(&request);
        assert_eq!(body.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_custom_model() {
        let provider = AnthropicProvider::new("test-key").with_model("claude-opus-4-20250514");
        let request = ChatRequest::user("hi");
        let body = provider.build_request_body(&request);
        assert_eq!(body.model, "claude-opus-4-20250514");
    }
}

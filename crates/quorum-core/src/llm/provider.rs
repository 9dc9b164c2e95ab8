//! LLM provider trait — the core capability the orchestrator dispatches on.
//!
//! All backends (Anthropic, OpenAI, the local GPU service) implement this
//! trait. The orchestrator treats provider errors as opaque: they are
//! captured as strings on the failing task, never interpreted.

use crate::BoxFuture;

use super::types::{AnalysisRequest, AnalysisResponse, ChatRequest, ChatResponse, ProviderKind};

/// Errors from LLM provider calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("authentication failed (check API key): {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("context length exceeded: {0}")]
    ContextLength(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider error: {status} — {message}")]
    ProviderError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,
}

/// Core trait for LLM providers.
///
/// Implementations must be `Send + Sync` for concurrent dispatch. Uses
/// `BoxFuture` for object safety (allows `Arc<dyn ProviderClient>`).
pub trait ProviderClient: Send + Sync {
    /// Provider display name (e.g. "Anthropic", "OpenAI").
    fn name(&self) -> &str;

    /// Which backend this client targets.
    fn provider(&self) -> ProviderKind;

    /// The model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Perform a chat completion.
    fn chat_completion(
        &self,
        request: &ChatRequest,
    ) -> BoxFuture<'_, Result<ChatResponse, LlmError>>;

    /// Perform a code analysis.
    ///
    /// The default implementation renders the request as an analysis prompt
    /// and runs it through [`chat_completion`](Self::chat_completion);
    /// providers with a native analysis endpoint may override it.
    fn code_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> BoxFuture<'_, Result<AnalysisResponse, LlmError>> {
        let kind = request.kind;
        let chat_request = ChatRequest {
            model: request.model.clone(),
            messages: vec![super::types::ChatMessage::user(request.render_prompt())],
            temperature: 0.0,
            ..Default::default()
        };
        Box::pin(async move {
            let response = self.chat_completion(&chat_request).await?;
            Ok(AnalysisResponse::from_chat(kind, response))
        })
    }

    /// Check whether the backend is reachable and serving.
    fn health_check(&self) -> BoxFuture<'_, Result<bool, LlmError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "rate limited: retry after 30s");

        let err = LlmError::ProviderError {
            status: 500,
            message: "internal".to_string(),
        };
        assert!(err.to_string().contains("500"));
    }
}

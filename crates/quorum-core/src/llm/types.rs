//! Common types for LLM provider integration.
//!
//! These types define the shared vocabulary for chat completions and code
//! analysis across all providers. Requests deliberately carry the full set
//! of sampling parameters because the response cache keys on them.

use serde::{Deserialize, Serialize};

// Provider identity is defined in quorum_config::ProviderKind; the core
// reuses it as the task/provider tag throughout.
pub use quorum_config::ProviderKind;

/// A chat message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier (e.g. "claude-sonnet-4-20250514", "gpt-4o").
    /// Empty = the adapter's default model.
    pub model: String,
    /// Conversation messages, in order.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0–2.0).
    pub temperature: f32,
    /// Nucleus sampling cutoff (0.0–1.0).
    pub top_p: f32,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            top_p: 1.0,
        }
    }
}

impl ChatRequest {
    /// A single-user-message request, the common case.
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Response from a chat completion.
///
/// `provider` is `None` when the response was reconstructed from the durable
/// cache tier, which persists content, model, and usage but not the serving
/// provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant's reply text.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Provider that served the response, when known.
    pub provider: Option<ProviderKind>,
    /// Token usage statistics.
    pub usage: TokenUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What a code-analysis request should look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// General code-quality review.
    Quality,
    /// Security-focused review.
    Security,
    /// Performance-focused review.
    Performance,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Quality => "quality",
            AnalysisKind::Security => "security",
            AnalysisKind::Performance => "performance",
        }
    }
}

/// Request for a code analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The code to analyse.
    pub code: String,
    /// Source language, when known (improves prompt quality).
    pub language: Option<String>,
    /// Analysis focus.
    pub kind: AnalysisKind,
    /// Optional project context prepended to the prompt.
    pub project_context: Option<String>,
    /// Model override (empty = adapter default).
    pub model: String,
}

impl AnalysisRequest {
    pub fn new(code: impl Into<String>, kind: AnalysisKind) -> Self {
        Self {
            code: code.into(),
            language: None,
            kind,
            project_context: None,
            model: String::new(),
        }
    }

    /// Render the analysis request as a chat prompt.
    pub fn render_prompt(&self) -> String {
        let lang = self.language.as_deref().unwrap_or("");
        let mut prompt = String::new();
        if let Some(ref ctx) = self.project_context {
            prompt.push_str("Project context:\n");
            prompt.push_str(ctx);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            "Perform a {} analysis of the following code. \
             Report concrete findings with line references.\n\n```{lang}\n{}\n```",
            self.kind.as_str(),
            self.code
        ));
        prompt
    }
}

/// Response from a code analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// The analysis text.
    pub findings: String,
    /// Analysis focus the findings answer.
    pub kind: AnalysisKind,
    /// Model that produced the analysis.
    pub model: String,
    /// Provider that served the analysis, when known.
    pub provider: Option<ProviderKind>,
    /// Token usage statistics.
    pub usage: TokenUsage,
}

impl AnalysisResponse {
    /// Build an analysis response from a chat completion.
    pub fn from_chat(kind: AnalysisKind, chat: ChatResponse) -> Self {
        Self {
            findings: chat.content,
            kind,
            model: chat.model,
            provider: chat.provider,
            usage: chat.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
        assert_eq!(ChatMessage::user("hello").content, "hello");
    }

    #[test]
    fn test_chat_request_defaults() {
        let req = ChatRequest::user("hi").with_model("gpt-4o");
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.max_tokens, 4096);
        assert!((req.top_p - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_analysis_prompt_includes_kind_and_code() {
        let req = AnalysisRequest::new("fn main() {}", AnalysisKind::Security);
        let prompt = req.render_prompt();
        assert!(prompt.contains("security analysis"));
        assert!(prompt.contains("fn main() {}"));
    }

    #[test]
    fn test_analysis_prompt_includes_context_and_language() {
        let mut req = AnalysisRequest::new("x = 1", AnalysisKind::Quality);
        req.language = Some("python".to_string());
        req.project_context = Some("data pipeline".to_string());
        let prompt = req.render_prompt();
        assert!(prompt.starts_with("Project context:\ndata pipeline"));
        assert!(prompt.contains("```python\n"));
    }

    #[test]
    fn test_analysis_response_from_chat() {
        let chat = ChatResponse {
            content: "looks fine".to_string(),
            model: "gpt-4o".to_string(),
            provider: Some(ProviderKind::OpenAi),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            },
        };
        let analysis = AnalysisResponse::from_chat(AnalysisKind::Quality, chat);
        assert_eq!(analysis.findings, "looks fine");
        assert_eq!(analysis.kind, AnalysisKind::Quality);
        assert_eq!(analysis.usage.total_tokens, 12);
    }
}

//! LLM provider integration — interchangeable chat-completion backends.
//!
//! Quorum talks to multiple LLM backends through a unified
//! [`ProviderClient`] trait. Currently supported:
//!
//! - **Anthropic** — Claude models via the Messages API
//! - **OpenAI** — GPT models via the Chat Completions API (also compatible
//!   with Ollama, vLLM, Together AI, and other OpenAI-compatible endpoints)
//! - **Local** — a self-hosted GPU inference service
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐
//! │ Orchestrator │────▶│ ProviderClient │  (trait)
//! └──────────────┘     └───────┬────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!      ┌──────────────┐ ┌──────────┐ ┌──────────────┐
//!      │  Anthropic   │ │  OpenAI  │ │    Local     │
//!      │ (Claude API) │ │ (GPT API)│ │ (GPU server) │
//!      └──────────────┘ └──────────┘ └──────────────┘
//! ```
//!
//! The adapters are deliberately thin; everything interesting about
//! dispatch (racing, broadcast, batching, caching) lives in
//! [`crate::orchestrator`].

pub mod anthropic;
pub mod local;
pub mod openai;
pub mod provider;
pub mod types;

use std::sync::Arc;

pub use anthropic::AnthropicProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmError, ProviderClient};
pub use types::*;

/// Create a provider client from a config entry.
///
/// Reads the entry's kind, credentials, model, and base URL to construct
/// the matching adapter.
pub fn create_provider(entry: &quorum_config::ProviderEntry) -> Arc<dyn ProviderClient> {
    match entry.kind {
        ProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(entry.resolve_api_key());
            if !entry.model.is_empty() {
                provider = provider.with_model(&entry.model);
            }
            Arc::new(provider)
        }
        ProviderKind::OpenAi => {
            let mut provider = OpenAiProvider::new(entry.resolve_api_key());
            if !entry.model.is_empty() {
                provider = provider.with_model(&entry.model);
            }
            if let Some(ref base_url) = entry.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        ProviderKind::Local => {
            let mut provider = match entry.base_url {
                Some(ref url) => LocalProvider::with_base_url(url),
                None => LocalProvider::new(),
            };
            if !entry.model.is_empty() {
                provider = provider.with_model(&entry.model);
            }
            Arc::new(provider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_config::ProviderEntry;

    fn entry(kind: ProviderKind) -> ProviderEntry {
        ProviderEntry {
            kind,
            api_key: "test-key".to_string(),
            api_key_env: None,
            model: String::new(),
            base_url: None,
            priority: 5,
            enabled: true,
        }
    }

    #[test]
    fn test_create_anthropic_provider() {
        let mut e = entry(ProviderKind::Anthropic);
        e.model = "claude-sonnet-4-20250514".to_string();
        let provider = create_provider(&e);
        assert_eq!(provider.name(), "Anthropic");
        assert_eq!(provider.provider(), ProviderKind::Anthropic);
        assert_eq!(provider.default_model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_create_openai_provider() {
        let provider = create_provider(&entry(ProviderKind::OpenAi));
        assert_eq!(provider.name(), "OpenAI");
        assert_eq!(provider.default_model(), "gpt-4o");
    }

    #[test]
    fn test_create_local_provider_with_base_url() {
        let mut e = entry(ProviderKind::Local);
        e.base_url = Some("http://gpu-box:9090".to_string());
        let provider = create_provider(&e);
        assert_eq!(provider.name(), "Local");
        assert_eq!(provider.provider(), ProviderKind::Local);
    }
}

//! Scripted mock providers.
//!
//! [`MockProvider`] implements [`ProviderClient`] with a scripted outcome
//! and artificial latency, and records call counts plus the concurrent
//! in-flight high-water mark. The high-water mark is what lets tests
//! assert batch concurrency bounds without timing heuristics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use quorum_core::BoxFuture;
use quorum_core::llm::{
    ChatRequest, ChatResponse, LlmError, ProviderClient, ProviderKind, TokenUsage,
};

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

/// A provider with a scripted outcome and artificial latency.
pub struct MockProvider {
    kind: ProviderKind,
    outcome: Result<String, String>,
    delay: Duration,
    healthy: bool,
    counters: Arc<Counters>,
}

impl MockProvider {
    /// A provider whose chat calls succeed with the given content.
    pub fn succeeding(kind: ProviderKind, content: &str) -> Self {
        Self {
            kind,
            outcome: Ok(content.to_string()),
            delay: Duration::ZERO,
            healthy: true,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A provider whose chat calls fail with the given error message.
    pub fn failing(kind: ProviderKind, error: &str) -> Self {
        Self {
            kind,
            outcome: Err(error.to_string()),
            delay: Duration::ZERO,
            healthy: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Sleep this long inside every chat call before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override the health-probe answer.
    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// A handle for reading this provider's call counters.
    pub fn probe(&self) -> MockProbe {
        MockProbe(Arc::clone(&self.counters))
    }
}

/// Read handle for a [`MockProvider`]'s counters.
#[derive(Clone)]
pub struct MockProbe(Arc<Counters>);

impl MockProbe {
    /// Total chat calls started.
    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    /// Chat calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.0.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of chat calls that were ever executing at once.
    pub fn high_water(&self) -> usize {
        self.0.high_water.load(Ordering::SeqCst)
    }
}

impl ProviderClient for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    fn provider(&self) -> ProviderKind {
        self.kind
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn chat_completion(
        &self,
        _request: &ChatRequest,
    ) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        Box::pin(async move {
            self.counters.calls.fetch_add(1, Ordering::SeqCst);
            let now_in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters
                .high_water
                .fetch_max(now_in_flight, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.outcome {
                Ok(ref content) => Ok(ChatResponse {
                    content: content.clone(),
                    model: "mock-model".to_string(),
                    provider: Some(self.kind),
                    usage: TokenUsage {
                        prompt_tokens: 1,
                        completion_tokens: 1,
                        total_tokens: 2,
                    },
                }),
                Err(ref message) => Err(LlmError::ProviderError {
                    status: 500,
                    message: message.clone(),
                }),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<bool, LlmError>> {
        Box::pin(async move { Ok(self.healthy) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_succeeding_mock() {
        let provider = MockProvider::succeeding(ProviderKind::OpenAi, "hello");
        let probe = provider.probe();

        let response = provider
            .chat_completion(&ChatRequest::user("hi"))
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(probe.calls(), 1);
        assert_eq!(probe.in_flight(), 0);
        assert_eq!(probe.high_water(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let provider = MockProvider::failing(ProviderKind::Local, "boom");
        let err = provider
            .chat_completion(&ChatRequest::user("hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(!provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_high_water_tracks_concurrency() {
        let provider = Arc::new(
            MockProvider::succeeding(ProviderKind::OpenAi, "ok")
                .with_delay(Duration::from_millis(50)),
        );
        let probe = provider.probe();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    provider
                        .chat_completion(&ChatRequest::user("hi"))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(probe.calls(), 3);
        assert_eq!(probe.high_water(), 3);
        assert_eq!(probe.in_flight(), 0);
    }
}

//! Orchestrator behavior that drives a mock provider end-to-end:
//! round-trip submission, cache short-circuiting, timeout enforcement,
//! and health checks.
//!
//! These live as integration tests (rather than in-crate unit tests)
//! because they rely on `quorum_test_utils::MockProvider`, and
//! `quorum-test-utils` depends on `quorum-core`. Using that mock from
//! inside `quorum-core`'s own `#[cfg(test)]` modules would link two
//! distinct copies of `quorum-core` into the test binary, so the mock's
//! `ProviderClient` impl would not match the crate under test.

use std::sync::Arc;
use std::time::Duration;

use quorum_core::llm::{ChatRequest, ProviderClient, ProviderKind};
use quorum_core::orchestrator::{
    Orchestrator, RequestOptions, TaskKind, TaskOutput, TaskStatus, TokioExecutor,
};
use quorum_core::ResponseCache;
use quorum_test_utils::providers::MockProvider;

fn orchestrator() -> Orchestrator {
    Orchestrator::new(Arc::new(TokioExecutor))
}

#[tokio::test]
async fn test_submit_and_wait_round_trip() {
    let orch = orchestrator();
    let provider = Arc::new(MockProvider::succeeding(ProviderKind::OpenAi, "pong"));

    let id = orch.submit_chat_request(
        provider,
        ChatRequest::user("ping"),
        RequestOptions::default(),
    );
    let task = orch.wait_for_request(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output.unwrap().as_chat().unwrap().content, "pong");
}

#[tokio::test]
async fn test_cache_hit_completes_without_dispatch() {
    let cache = Arc::new(ResponseCache::in_memory(16, Duration::from_secs(60)));
    let orch = orchestrator().with_cache(Arc::clone(&cache));
    let provider = Arc::new(MockProvider::succeeding(ProviderKind::OpenAi, "fresh"));
    let probe = provider.probe();
    let request = ChatRequest::user("cached question");

    let first = orch.submit_chat_request(
        Arc::clone(&provider) as Arc<dyn ProviderClient>,
        request.clone(),
        RequestOptions::default(),
    );
    orch.wait_for_request(first).await.unwrap();
    assert_eq!(probe.calls(), 1);

    // Second submission is served from the cache: no provider call
    let second =
        orch.submit_chat_request(provider, request, RequestOptions::default());
    let task = orch.wait_for_request(second).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output.unwrap().as_chat().unwrap().content, "fresh");
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn test_timeout_fails_the_task() {
    let orch = orchestrator();
    let provider = Arc::new(
        MockProvider::succeeding(ProviderKind::OpenAi, "slow")
            .with_delay(Duration::from_millis(500)),
    );

    let id = orch.submit_chat_request(
        provider,
        ChatRequest::user("hi"),
        RequestOptions::default().with_timeout_ms(20),
    );
    let task = orch.wait_for_request(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_info.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_health_check_task() {
    let orch = orchestrator();
    let provider = Arc::new(MockProvider::succeeding(ProviderKind::Local, "unused"));

    let id = orch.submit_health_check(provider, RequestOptions::default());
    let task = orch.wait_for_request(id).await.unwrap();

    assert_eq!(task.kind, TaskKind::HealthCheck);
    match task.output.unwrap() {
        TaskOutput::Health { healthy, .. } => assert!(healthy),
        other => panic!("unexpected output: {other:?}"),
    }
}

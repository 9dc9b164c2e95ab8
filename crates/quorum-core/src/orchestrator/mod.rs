//! Concurrent multi-provider request orchestrator.
//!
//! The orchestrator dispatches the same logical request across
//! interchangeable providers: fire-and-poll single submissions, batches
//! under a concurrency bound, races (first success wins, losers are
//! cancelled), and broadcasts (wait for all, keep every success). A
//! two-tier [response cache](crate::cache) is consulted before dispatch
//! and populated after successful calls.
//!
//! ## Semantics worth knowing
//!
//! - **Submission never blocks.** `submit_*` registers a task and returns
//!   its id; only the `wait_*`/`race_*`/`broadcast_*` methods await.
//! - **Cancellation is cooperative.** `cancel_request` flips the task's
//!   state; an in-flight provider call is not interrupted, but its late
//!   result is discarded rather than overwriting the cancellation.
//! - **Timeouts are enforced.** A provider call exceeding
//!   `RequestOptions::timeout_ms` fails the task with a timeout message.
//! - **`retry_count` is advisory.** The orchestrator never resubmits a
//!   failed task; retry policy belongs to the caller.
//! - **Callbacks run on whichever context finalizes the task** — the
//!   worker, or the canceller for tasks cancelled before completion.
//!   Prefer `wait_for_request`, which needs no such reasoning.

pub(crate) mod dispatch;
pub mod executor;
pub mod registry;
pub mod task;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::health::ProviderManager;
use crate::llm::{AnalysisRequest, ChatMessage, ChatRequest, ChatResponse, ProviderClient};

use dispatch::{Payload, WorkerContext};
pub use executor::{DedicatedExecutor, Executor, TokioExecutor};
pub use registry::{RequestStats, TaskCallback, TaskRegistry};
use registry::CancelOutcome;
pub use task::{RequestOptions, Task, TaskId, TaskKind, TaskOutput, TaskStatus};

/// Default age after which terminal tasks are purged by
/// [`Orchestrator::cleanup_completed_tasks`].
pub const DEFAULT_CLEANUP_THRESHOLD: Duration = Duration::from_secs(300);

/// Errors surfaced by the orchestrator itself.
///
/// Per-task provider failures are *contained*: they land in
/// [`Task::error_info`], never here. Only whole-operation failures (unknown
/// ids, empty candidate lists, a race with zero survivors) become errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("unknown request id: {0}")]
    RequestNotFound(TaskId),

    #[error("no candidate providers supplied")]
    NoProviders,

    #[error("all {attempted} providers failed")]
    AllProvidersFailed { attempted: usize },
}

/// One request in a batch submission.
pub struct BatchRequest {
    pub client: Arc<dyn ProviderClient>,
    pub request: ChatRequest,
    pub options: RequestOptions,
}

/// Options governing a batch submission.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Maximum number of simultaneously in-flight tasks.
    pub max_concurrent: usize,
    /// Once any task fails, cancel everything not yet admitted.
    pub fail_fast: bool,
    /// Default per-task timeout for requests that do not set their own.
    pub timeout_ms: Option<u64>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            fail_fast: false,
            timeout_ms: None,
        }
    }
}

/// The public face of the concurrency core.
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    executor: Arc<dyn Executor>,
    cache: Option<Arc<ResponseCache>>,
    health: Option<Arc<ProviderManager>>,
    cleanup_threshold: Duration,
}

impl Orchestrator {
    /// Create an orchestrator running workers on the given executor.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            executor,
            cache: None,
            health: None,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
        }
    }

    /// Attach a response cache, consulted before dispatching chat requests.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a health manager that workers report call outcomes to.
    pub fn with_health_manager(mut self, manager: Arc<ProviderManager>) -> Self {
        self.health = Some(manager);
        self
    }

    /// Override the terminal-task retention threshold.
    pub fn with_cleanup_threshold(mut self, threshold: Duration) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
            health: self.health.clone(),
        }
    }

    // ── Submission ──────────────────────────────────────────────────────

    /// Submit a chat completion. Returns immediately with the task id.
    pub fn submit_chat_request(
        &self,
        client: Arc<dyn ProviderClient>,
        request: ChatRequest,
        options: RequestOptions,
    ) -> TaskId {
        self.submit(client, Payload::Chat(request), options, None)
    }

    /// Like [`submit_chat_request`](Self::submit_chat_request), invoking
    /// `callback` exactly once when the task reaches a terminal state.
    pub fn submit_chat_request_with_callback(
        &self,
        client: Arc<dyn ProviderClient>,
        request: ChatRequest,
        options: RequestOptions,
        callback: TaskCallback,
    ) -> TaskId {
        self.submit(client, Payload::Chat(request), options, Some(callback))
    }

    /// Submit a code analysis.
    pub fn submit_code_analysis_request(
        &self,
        client: Arc<dyn ProviderClient>,
        request: AnalysisRequest,
        options: RequestOptions,
    ) -> TaskId {
        self.submit(client, Payload::Analysis(request), options, None)
    }

    /// Submit a code completion (chat-templated under the hood).
    pub fn submit_code_completion_request(
        &self,
        client: Arc<dyn ProviderClient>,
        code: &str,
        language: Option<&str>,
        options: RequestOptions,
    ) -> TaskId {
        let request = completion_request(code, language);
        self.submit(client, Payload::Completion(request), options, None)
    }

    /// Submit a code explanation (chat-templated under the hood).
    pub fn submit_code_explanation_request(
        &self,
        client: Arc<dyn ProviderClient>,
        code: &str,
        language: Option<&str>,
        options: RequestOptions,
    ) -> TaskId {
        let request = explanation_request(code, language);
        self.submit(client, Payload::Explanation(request), options, None)
    }

    /// Submit a provider health probe.
    pub fn submit_health_check(
        &self,
        client: Arc<dyn ProviderClient>,
        options: RequestOptions,
    ) -> TaskId {
        self.submit(client, Payload::Health, options, None)
    }

    fn submit(
        &self,
        client: Arc<dyn ProviderClient>,
        payload: Payload,
        options: RequestOptions,
        callback: Option<TaskCallback>,
    ) -> TaskId {
        let provider = client.provider();
        let kind = payload.kind();

        // Cache interposition: a hit completes the task without dispatch,
        // keeping the API uniform for callers
        if let Payload::Chat(ref request) = payload {
            if let Some(ref cache) = self.cache {
                if let Some(response) = cache.get(request) {
                    let id = self.registry.create(provider, kind, options, callback);
                    debug!(task = %id, provider = %provider, "response cache hit, skipping dispatch");
                    self.registry.begin(id);
                    if let Some(finished) = self.registry.complete(id, TaskOutput::Chat(response)) {
                        finished.notify();
                    }
                    return id;
                }
            }
        }

        let id = self.registry.create(provider, kind, options, callback);
        debug!(task = %id, provider = %provider, kind = ?kind, "dispatching task");
        dispatch::spawn_worker(
            self.worker_context(),
            &*self.executor,
            id,
            client,
            payload,
            options,
            None,
            None,
        );
        id
    }

    /// Submit a batch of chat requests under a concurrency bound.
    ///
    /// All task ids are returned immediately; an admission loop on the
    /// executor feeds tasks to workers as semaphore permits free up, so at
    /// most `max_concurrent` tasks are in flight at any instant. Admission
    /// order is by descending `RequestOptions::priority` (stable within
    /// equal priorities); no FIFO guarantee beyond that. With `fail_fast`,
    /// a single failure cancels every task not yet admitted.
    pub fn submit_batch_requests(
        &self,
        requests: Vec<BatchRequest>,
        options: BatchOptions,
    ) -> Vec<TaskId> {
        let mut admissions: Vec<(TaskId, BatchRequest)> = requests
            .into_iter()
            .map(|mut batch_request| {
                if batch_request.options.timeout_ms.is_none() {
                    batch_request.options.timeout_ms = options.timeout_ms;
                }
                let id = self.registry.create(
                    batch_request.client.provider(),
                    TaskKind::ChatCompletion,
                    batch_request.options,
                    None,
                );
                (id, batch_request)
            })
            .collect();

        let ids: Vec<TaskId> = admissions.iter().map(|(id, _)| *id).collect();
        info!(
            count = ids.len(),
            max_concurrent = options.max_concurrent,
            fail_fast = options.fail_fast,
            "batch submitted"
        );

        // Higher priority first; the sort is stable, so equal priorities
        // keep submission order
        admissions.sort_by(|a, b| b.1.options.priority.cmp(&a.1.options.priority));

        let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        let failure_flag = Arc::new(AtomicBool::new(false));
        let context = self.worker_context();
        let executor = Arc::clone(&self.executor);
        let fail_fast = options.fail_fast;

        self.executor.spawn(Box::pin(async move {
            for (id, batch_request) in admissions {
                if fail_fast && failure_flag.load(Ordering::SeqCst) {
                    if let CancelOutcome::Cancelled(finished) = context.registry.cancel(id) {
                        debug!(task = %id, "batch fail-fast, cancelling before dispatch");
                        finished.notify();
                    }
                    continue;
                }
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                // A failure may have landed while this slot was blocked on
                // the semaphore; re-check before dispatching
                if fail_fast && failure_flag.load(Ordering::SeqCst) {
                    drop(permit);
                    if let CancelOutcome::Cancelled(finished) = context.registry.cancel(id) {
                        debug!(task = %id, "batch fail-fast, cancelling before dispatch");
                        finished.notify();
                    }
                    continue;
                }
                dispatch::spawn_worker(
                    context.clone(),
                    &*executor,
                    id,
                    batch_request.client,
                    Payload::Chat(batch_request.request),
                    batch_request.options,
                    Some(permit),
                    Some(Arc::clone(&failure_flag)),
                );
            }
        }));

        ids
    }

    // ── Waiting & cancellation ──────────────────────────────────────────

    /// Wait until the task reaches a terminal state and return its
    /// snapshot. Fails with [`OrchestratorError::RequestNotFound`] for ids
    /// that never existed or were already purged.
    pub async fn wait_for_request(&self, id: TaskId) -> Result<Task, OrchestratorError> {
        let mut status_rx = self
            .registry
            .watch(id)
            .ok_or(OrchestratorError::RequestNotFound(id))?;

        // An Err means the entry was purged mid-wait; fall through to the
        // final lookup, which reports NotFound
        let _ = status_rx.wait_for(|status| status.is_terminal()).await;

        self.registry
            .get(id)
            .ok_or(OrchestratorError::RequestNotFound(id))
    }

    /// Wait for every id in turn, returning snapshots in *input* order
    /// (not completion order).
    pub async fn wait_for_all_requests(
        &self,
        ids: &[TaskId],
    ) -> Result<Vec<Task>, OrchestratorError> {
        let mut tasks = Vec::with_capacity(ids.len());
        for &id in ids {
            tasks.push(self.wait_for_request(id).await?);
        }
        Ok(tasks)
    }

    /// Cancel a request. Cancelling an already-terminal task is a no-op,
    /// not an error; unknown ids fail with
    /// [`OrchestratorError::RequestNotFound`]. A provider call already in
    /// flight runs to completion, but its result is discarded.
    pub fn cancel_request(&self, id: TaskId) -> Result<(), OrchestratorError> {
        match self.registry.cancel(id) {
            CancelOutcome::Cancelled(finished) => {
                info!(task = %id, "request cancelled");
                finished.notify();
                Ok(())
            }
            CancelOutcome::AlreadyTerminal => Ok(()),
            CancelOutcome::NotFound => Err(OrchestratorError::RequestNotFound(id)),
        }
    }

    // ── Racing & broadcasting ───────────────────────────────────────────

    /// Race the same request across several providers: the first task to
    /// complete wins, every other task is cancelled, and the winning
    /// response is returned. Fails with
    /// [`OrchestratorError::AllProvidersFailed`] when no candidate
    /// succeeds, and [`OrchestratorError::NoProviders`] for an empty
    /// candidate list.
    ///
    /// Which provider wins a near-tie depends on completion-event arrival
    /// order; only "a fastest success wins" is guaranteed.
    pub async fn race_providers(
        &self,
        clients: &[Arc<dyn ProviderClient>],
        request: ChatRequest,
        options: RequestOptions,
    ) -> Result<ChatResponse, OrchestratorError> {
        if clients.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let ids: Vec<TaskId> = clients
            .iter()
            .map(|client| self.submit_chat_request(Arc::clone(client), request.clone(), options))
            .collect();
        info!(candidates = ids.len(), "racing providers");

        let (done_tx, mut done_rx) = mpsc::channel::<TaskId>(ids.len());
        for &id in &ids {
            match self.registry.watch(id) {
                Some(mut status_rx) => {
                    let tx = done_tx.clone();
                    self.executor.spawn(Box::pin(async move {
                        let _ = status_rx.wait_for(|status| status.is_terminal()).await;
                        let _ = tx.send(id).await;
                    }));
                }
                // Purged before we could subscribe; count it as terminal
                None => {
                    let _ = done_tx.try_send(id);
                }
            }
        }
        drop(done_tx);

        let mut observed = 0usize;
        while let Some(done_id) = done_rx.recv().await {
            observed += 1;
            let task = self.registry.get(done_id);
            let won = matches!(
                task.as_ref().map(|t| t.status),
                Some(TaskStatus::Completed)
            );
            if won {
                if let Some(TaskOutput::Chat(response)) = task.and_then(|t| t.output) {
                    info!(winner = %done_id, "race won, cancelling remaining candidates");
                    for &other in &ids {
                        if other != done_id {
                            let _ = self.cancel_request(other);
                        }
                    }
                    return Ok(response);
                }
            }
            if observed == ids.len() {
                break;
            }
        }

        Err(OrchestratorError::AllProvidersFailed {
            attempted: ids.len(),
        })
    }

    /// Broadcast the same request to several providers, wait for all of
    /// them, and return every successful response (order matches the
    /// candidate list). Individual failures are logged and dropped; an
    /// empty result list is not an error. An empty *candidate* list fails
    /// with [`OrchestratorError::NoProviders`].
    pub async fn broadcast_to_providers(
        &self,
        clients: &[Arc<dyn ProviderClient>],
        request: ChatRequest,
        options: RequestOptions,
    ) -> Result<Vec<ChatResponse>, OrchestratorError> {
        if clients.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let ids: Vec<TaskId> = clients
            .iter()
            .map(|client| self.submit_chat_request(Arc::clone(client), request.clone(), options))
            .collect();
        info!(candidates = ids.len(), "broadcasting to providers");

        let mut responses = Vec::new();
        for &id in &ids {
            match self.wait_for_request(id).await {
                Ok(task) => match task.status {
                    TaskStatus::Completed => {
                        if let Some(TaskOutput::Chat(response)) = task.output {
                            responses.push(response);
                        }
                    }
                    TaskStatus::Failed => {
                        warn!(
                            task = %id,
                            provider = %task.provider,
                            error = task.error_info.as_deref().unwrap_or("unknown"),
                            "broadcast candidate failed"
                        );
                    }
                    _ => {
                        warn!(task = %id, provider = %task.provider, "broadcast candidate cancelled");
                    }
                },
                Err(e) => {
                    warn!(task = %id, error = %e, "broadcast candidate vanished mid-wait");
                }
            }
        }
        Ok(responses)
    }

    // ── Introspection & maintenance ─────────────────────────────────────

    /// Status of a task, if it is still registered.
    pub fn request_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.registry.status(id)
    }

    /// Number of tasks currently pending or in flight.
    pub fn active_request_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Aggregate statistics over registered tasks.
    pub fn request_stats(&self) -> RequestStats {
        self.registry.stats()
    }

    /// Purge tasks that have been terminal for longer than the cleanup
    /// threshold. Returns the number of tasks removed.
    pub fn cleanup_completed_tasks(&self) -> usize {
        let purged = self.registry.cleanup(self.cleanup_threshold);
        if purged > 0 {
            debug!(purged, "purged stale terminal tasks");
        }
        purged
    }
}

// ── Prompt templates for the chat-shaped code tasks ─────────────────────

fn completion_request(code: &str, language: Option<&str>) -> ChatRequest {
    let lang = language.unwrap_or("");
    ChatRequest {
        messages: vec![
            ChatMessage::system(
                "You are a code completion engine. Continue the given code. \
                 Respond with code only, no prose.",
            ),
            ChatMessage::user(format!("```{lang}\n{code}\n```")),
        ],
        temperature: 0.2,
        ..Default::default()
    }
}

fn explanation_request(code: &str, language: Option<&str>) -> ChatRequest {
    let lang = language.unwrap_or("");
    ChatRequest {
        messages: vec![
            ChatMessage::system(
                "Explain what the given code does, including any subtle behavior.",
            ),
            ChatMessage::user(format!("```{lang}\n{code}\n```")),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that drive a `MockProvider` end-to-end live in
    // `tests/orchestrator_providers.rs`: `quorum-test-utils` depends on
    // `quorum-core`, so using its mock from inside this crate's own unit
    // tests would link two copies of `quorum-core` and the mock's
    // `ProviderClient` impl would not match the crate under test.

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(TokioExecutor))
    }

    #[tokio::test]
    async fn test_wait_for_unknown_id() {
        let orch = orchestrator();
        let result = orch.wait_for_request(TaskId(404)).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::RequestNotFound(TaskId(404)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_id_is_an_error() {
        let orch = orchestrator();
        assert!(orch.cancel_request(TaskId(404)).is_err());
    }

    #[tokio::test]
    async fn test_race_with_no_candidates() {
        let orch = orchestrator();
        let result = orch
            .race_providers(&[], ChatRequest::user("hi"), RequestOptions::default())
            .await;
        assert!(matches!(result, Err(OrchestratorError::NoProviders)));
    }

    #[tokio::test]
    async fn test_broadcast_with_no_candidates() {
        let orch = orchestrator();
        let result = orch
            .broadcast_to_providers(&[], ChatRequest::user("hi"), RequestOptions::default())
            .await;
        assert!(matches!(result, Err(OrchestratorError::NoProviders)));
    }

    #[test]
    fn test_prompt_templates_embed_code() {
        let completion = completion_request("fn half_done(", Some("rust"));
        assert!(completion.messages[1].content.contains("fn half_done("));
        assert!(completion.messages[1].content.contains("```rust"));

        let explanation = explanation_request("x = 1", None);
        assert_eq!(explanation.messages[0].role, "system");
        assert!(explanation.messages[1].content.contains("x = 1"));
    }
}

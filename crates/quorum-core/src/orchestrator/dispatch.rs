//! Worker dispatch — runs a task's provider call and finalizes the task.
//!
//! This is the only code that writes a task's output or error after
//! creation. The worker observes the check-before-write discipline: a task
//! cancelled while its call is in flight keeps its `Cancelled` state and
//! the late result is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::health::ProviderManager;
use crate::llm::{AnalysisRequest, ChatRequest, ProviderClient};

use super::executor::Executor;
use super::registry::TaskRegistry;
use super::task::{RequestOptions, TaskId, TaskKind, TaskOutput};

/// The captured request a worker executes, one variant per task kind.
pub(crate) enum Payload {
    Chat(ChatRequest),
    Completion(ChatRequest),
    Analysis(AnalysisRequest),
    Explanation(ChatRequest),
    Health,
}

impl Payload {
    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            Payload::Chat(_) => TaskKind::ChatCompletion,
            Payload::Completion(_) => TaskKind::CodeCompletion,
            Payload::Analysis(_) => TaskKind::CodeAnalysis,
            Payload::Explanation(_) => TaskKind::CodeExplanation,
            Payload::Health => TaskKind::HealthCheck,
        }
    }
}

/// Shared collaborators a worker needs besides the client itself.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub registry: Arc<TaskRegistry>,
    pub cache: Option<Arc<ResponseCache>>,
    pub health: Option<Arc<ProviderManager>>,
}

/// Schedule a worker for the given task on the executor.
///
/// `permit` (batch admission) is held until the task finalizes;
/// `failure_flag` is raised when the task fails, for fail-fast batches.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_worker(
    ctx: WorkerContext,
    executor: &dyn Executor,
    id: TaskId,
    client: Arc<dyn ProviderClient>,
    payload: Payload,
    options: RequestOptions,
    permit: Option<OwnedSemaphorePermit>,
    failure_flag: Option<Arc<AtomicBool>>,
) {
    executor.spawn(Box::pin(run_task(
        ctx,
        id,
        client,
        payload,
        options,
        permit,
        failure_flag,
    )));
}

async fn run_task(
    ctx: WorkerContext,
    id: TaskId,
    client: Arc<dyn ProviderClient>,
    payload: Payload,
    options: RequestOptions,
    permit: Option<OwnedSemaphorePermit>,
    failure_flag: Option<Arc<AtomicBool>>,
) {
    // Held until the task finalizes so the batch bound counts this slot
    let _permit = permit;

    if !ctx.registry.begin(id) {
        debug!(task = %id, "task no longer pending, skipping provider call");
        return;
    }

    let started = Instant::now();
    let result = call_provider(&*client, &payload, options.timeout_ms).await;
    let elapsed = started.elapsed();

    if let Some(ref manager) = ctx.health {
        manager.update_health(client.provider(), result.is_ok(), elapsed);
    }

    match result {
        Ok(output) => {
            // Populate the cache before publishing the terminal state so a
            // caller woken by completion sees the cached entry too
            if let Payload::Chat(ref request) = payload {
                if let TaskOutput::Chat(ref response) = output {
                    if let Some(ref cache) = ctx.cache {
                        cache.put(request, response);
                    }
                }
            }
            match ctx.registry.complete(id, output) {
                Some(finished) => {
                    debug!(task = %id, elapsed_ms = elapsed.as_millis() as u64, "task completed");
                    finished.notify();
                }
                None => {
                    debug!(task = %id, "late result discarded, task was cancelled in flight");
                }
            }
        }
        Err(message) => {
            warn!(task = %id, error = %message, "provider call failed");
            if let Some(ref flag) = failure_flag {
                flag.store(true, Ordering::SeqCst);
            }
            if let Some(finished) = ctx.registry.fail(id, message) {
                finished.notify();
            }
        }
    }
}

/// Execute the provider call for a payload, under the request timeout when
/// one is set. Errors are flattened to strings: the orchestrator treats
/// provider failures as opaque.
async fn call_provider(
    client: &dyn ProviderClient,
    payload: &Payload,
    timeout_ms: Option<u64>,
) -> Result<TaskOutput, String> {
    let call = async {
        match payload {
            Payload::Chat(request) => client
                .chat_completion(request)
                .await
                .map(TaskOutput::Chat)
                .map_err(|e| e.to_string()),
            Payload::Completion(request) => client
                .chat_completion(request)
                .await
                .map(TaskOutput::Completion)
                .map_err(|e| e.to_string()),
            Payload::Analysis(request) => client
                .code_analysis(request)
                .await
                .map(TaskOutput::Analysis)
                .map_err(|e| e.to_string()),
            Payload::Explanation(request) => client
                .chat_completion(request)
                .await
                .map(TaskOutput::Explanation)
                .map_err(|e| e.to_string()),
            Payload::Health => {
                let probe_start = Instant::now();
                client
                    .health_check()
                    .await
                    .map(|healthy| TaskOutput::Health {
                        healthy,
                        latency_ms: probe_start.elapsed().as_millis() as u64,
                    })
                    .map_err(|e| e.to_string())
            }
        }
    };

    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), call)
            .await
            .unwrap_or_else(|_| Err(format!("timed out after {ms}ms"))),
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind_mapping() {
        assert_eq!(
            Payload::Chat(ChatRequest::default()).kind(),
            TaskKind::ChatCompletion
        );
        assert_eq!(Payload::Health.kind(), TaskKind::HealthCheck);
        assert_eq!(
            Payload::Explanation(ChatRequest::default()).kind(),
            TaskKind::CodeExplanation
        );
    }
}

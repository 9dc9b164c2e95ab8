//! Task registry — thread-safe bookkeeping for all dispatched tasks.
//!
//! The registry owns the live [`Task`] values and guards every state
//! transition. Waiters never hold the map lock: each entry carries a
//! `watch` channel that is signalled on every transition, so polling reads
//! observe the latest terminal state lock-free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use crate::llm::ProviderKind;

use super::task::{RequestOptions, Task, TaskId, TaskKind, TaskOutput, TaskStatus};

/// Completion callback, invoked exactly once with the finalized task.
pub type TaskCallback = Box<dyn FnOnce(&Task) + Send + 'static>;

/// A task that just reached a terminal state, plus its callback (if any).
///
/// Returned by the transition methods so the callback runs outside the
/// registry lock, on the execution context that performed the transition.
pub(crate) struct Finished {
    pub callback: Option<TaskCallback>,
    pub task: Task,
}

impl Finished {
    /// Invoke the callback, if one was registered.
    pub fn notify(self) {
        if let Some(cb) = self.callback {
            cb(&self.task);
        }
    }
}

/// Outcome of a cancellation attempt.
pub(crate) enum CancelOutcome {
    /// The task was non-terminal and is now cancelled.
    Cancelled(Finished),
    /// The task had already reached a terminal state; nothing changed.
    AlreadyTerminal,
    /// No task with that id is registered.
    NotFound,
}

struct TaskEntry {
    task: Task,
    status_tx: watch::Sender<TaskStatus>,
    callback: Option<TaskCallback>,
}

/// Aggregate statistics over the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestStats {
    /// Tasks ever created, independent of purging.
    pub total_submitted: u64,
    /// Tasks currently pending or in progress.
    pub active: usize,
    /// Registered tasks in `Completed` state.
    pub completed: usize,
    /// Registered tasks in `Failed` state.
    pub failed: usize,
    /// Registered tasks in `Cancelled` state.
    pub cancelled: usize,
    /// Mean creation-to-completion time over registered completed tasks.
    pub avg_completion_time_ms: f64,
}

/// Thread-safe map from task id to task.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    next_id: AtomicU64,
    total_submitted: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            total_submitted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        // A poisoned map is still structurally sound; transitions are
        // individually guarded, so continue rather than propagate the panic.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate and register a new pending task.
    pub(crate) fn create(
        &self,
        provider: ProviderKind,
        kind: TaskKind,
        options: RequestOptions,
        callback: Option<TaskCallback>,
    ) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.total_submitted.fetch_add(1, Ordering::Relaxed);

        let (status_tx, _status_rx) = watch::channel(TaskStatus::Pending);
        let entry = TaskEntry {
            task: Task::new(id, provider, kind, options),
            status_tx,
            callback,
        };
        self.lock().insert(id, entry);
        id
    }

    /// Owned snapshot of a task.
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.lock().get(&id).map(|e| e.task.clone())
    }

    /// Current status of a task.
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.lock().get(&id).map(|e| e.task.status)
    }

    /// Subscribe to a task's status transitions.
    pub(crate) fn watch(&self, id: TaskId) -> Option<watch::Receiver<TaskStatus>> {
        self.lock().get(&id).map(|e| e.status_tx.subscribe())
    }

    /// Delete a task outright. Returns whether it existed.
    pub fn remove(&self, id: TaskId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Transition `Pending → InProgress`. Returns false when the task is
    /// missing or no longer pending (e.g. cancelled before dispatch), in
    /// which case the worker must not run the provider call.
    pub(crate) fn begin(&self, id: TaskId) -> bool {
        let mut tasks = self.lock();
        let Some(entry) = tasks.get_mut(&id) else {
            return false;
        };
        if entry.task.status != TaskStatus::Pending {
            return false;
        }
        entry.task.status = TaskStatus::InProgress;
        entry.status_tx.send_replace(TaskStatus::InProgress);
        true
    }

    /// Finalize a task as `Completed` with its output.
    ///
    /// Check-before-write: returns `None` without touching the task when it
    /// is no longer `InProgress` — a task cancelled mid-flight keeps its
    /// `Cancelled` state and the late result is discarded.
    pub(crate) fn complete(&self, id: TaskId, output: TaskOutput) -> Option<Finished> {
        self.finalize(id, TaskStatus::Completed, Some(output), None)
    }

    /// Finalize a task as `Failed` with a description of the error.
    ///
    /// Same check-before-write discipline as [`complete`](Self::complete).
    pub(crate) fn fail(&self, id: TaskId, error_info: String) -> Option<Finished> {
        self.finalize(id, TaskStatus::Failed, None, Some(error_info))
    }

    fn finalize(
        &self,
        id: TaskId,
        status: TaskStatus,
        output: Option<TaskOutput>,
        error_info: Option<String>,
    ) -> Option<Finished> {
        let mut tasks = self.lock();
        let entry = tasks.get_mut(&id)?;
        if entry.task.status != TaskStatus::InProgress {
            return None;
        }
        entry.task.status = status;
        entry.task.output = output;
        entry.task.error_info = error_info;
        entry.task.completion_time = Some(SystemTime::now());
        entry.status_tx.send_replace(status);
        Some(Finished {
            callback: entry.callback.take(),
            task: entry.task.clone(),
        })
    }

    /// Cancel a task unless it is already terminal.
    pub(crate) fn cancel(&self, id: TaskId) -> CancelOutcome {
        let mut tasks = self.lock();
        let Some(entry) = tasks.get_mut(&id) else {
            return CancelOutcome::NotFound;
        };
        if entry.task.status.is_terminal() {
            return CancelOutcome::AlreadyTerminal;
        }
        entry.task.status = TaskStatus::Cancelled;
        entry.task.completion_time = Some(SystemTime::now());
        entry.status_tx.send_replace(TaskStatus::Cancelled);
        CancelOutcome::Cancelled(Finished {
            callback: entry.callback.take(),
            task: entry.task.clone(),
        })
    }

    /// Number of tasks currently pending or in progress.
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| !e.task.status.is_terminal())
            .count()
    }

    /// Aggregate statistics over registered tasks.
    pub fn stats(&self) -> RequestStats {
        let tasks = self.lock();
        let mut stats = RequestStats {
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            active: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            avg_completion_time_ms: 0.0,
        };

        let mut completion_total_ms = 0u64;
        for entry in tasks.values() {
            match entry.task.status {
                TaskStatus::Pending | TaskStatus::InProgress => stats.active += 1,
                TaskStatus::Completed => {
                    stats.completed += 1;
                    completion_total_ms += entry.task.completion_time_ms().unwrap_or(0);
                }
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        if stats.completed > 0 {
            stats.avg_completion_time_ms = completion_total_ms as f64 / stats.completed as f64;
        }
        stats
    }

    /// Purge tasks that have been terminal for longer than `threshold`.
    /// Returns the number of tasks removed.
    pub(crate) fn cleanup(&self, threshold: Duration) -> usize {
        let now = SystemTime::now();
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|_, entry| {
            if !entry.task.status.is_terminal() {
                return true;
            }
            match entry.task.completion_time {
                Some(done) => match now.duration_since(done) {
                    Ok(age) => age <= threshold,
                    // Clock went backwards; keep the entry for a later sweep
                    Err(_) => true,
                },
                None => true,
            }
        });
        before - tasks.len()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, TokenUsage};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn chat_output(content: &str) -> TaskOutput {
        TaskOutput::Chat(ChatResponse {
            content: content.to_string(),
            model: "test-model".to_string(),
            provider: Some(ProviderKind::OpenAi),
            usage: TokenUsage::default(),
        })
    }

    fn create_default(registry: &TaskRegistry) -> TaskId {
        registry.create(
            ProviderKind::OpenAi,
            TaskKind::ChatCompletion,
            RequestOptions::default(),
            None,
        )
    }

    #[test]
    fn test_ids_are_strictly_increasing() {
        let registry = TaskRegistry::new();
        let mut previous = None;
        for _ in 0..100 {
            let id = create_default(&registry);
            if let Some(prev) = previous {
                assert!(id > prev);
            }
            previous = Some(id);
        }
        assert_eq!(registry.stats().total_submitted, 100);
    }

    #[test]
    fn test_lifecycle_pending_to_completed() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        assert_eq!(registry.status(id), Some(TaskStatus::Pending));

        assert!(registry.begin(id));
        assert_eq!(registry.status(id), Some(TaskStatus::InProgress));

        let finished = registry.complete(id, chat_output("done")).unwrap();
        assert_eq!(finished.task.status, TaskStatus::Completed);
        assert!(finished.task.output.is_some());
        assert!(finished.task.error_info.is_none());
        assert!(finished.task.completion_time.is_some());
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        assert!(registry.begin(id));
        assert!(!registry.begin(id));
    }

    #[test]
    fn test_fail_sets_error_info_only() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        registry.begin(id);
        let finished = registry.fail(id, "connection refused".to_string()).unwrap();
        assert_eq!(finished.task.status, TaskStatus::Failed);
        assert!(finished.task.output.is_none());
        assert_eq!(finished.task.error_info.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_cancel_pending_blocks_begin() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        assert!(matches!(registry.cancel(id), CancelOutcome::Cancelled(_)));
        // The worker must now refuse to run the provider call
        assert!(!registry.begin(id));
        assert_eq!(registry.status(id), Some(TaskStatus::Cancelled));
    }

    #[test]
    fn test_late_result_does_not_overwrite_cancellation() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        registry.begin(id);
        assert!(matches!(registry.cancel(id), CancelOutcome::Cancelled(_)));

        // The in-flight call returns after cancellation: discarded
        assert!(registry.complete(id, chat_output("late")).is_none());
        let task = registry.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.output.is_none());
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        registry.begin(id);
        registry.complete(id, chat_output("done"));

        assert!(matches!(registry.cancel(id), CancelOutcome::AlreadyTerminal));
        assert_eq!(registry.status(id), Some(TaskStatus::Completed));
    }

    #[test]
    fn test_cancel_unknown_id() {
        let registry = TaskRegistry::new();
        assert!(matches!(registry.cancel(TaskId(999)), CancelOutcome::NotFound));
    }

    #[test]
    fn test_callback_fires_exactly_once() {
        let registry = TaskRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cb = Arc::clone(&calls);
        let id = registry.create(
            ProviderKind::OpenAi,
            TaskKind::ChatCompletion,
            RequestOptions::default(),
            Some(Box::new(move |task| {
                assert!(task.is_terminal());
                calls_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );
        registry.begin(id);
        registry.complete(id, chat_output("done")).unwrap().notify();

        // Cancellation after completion must not re-trigger it
        registry.cancel(id);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_observes_terminal_transition() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        let mut rx = registry.watch(id).unwrap();

        registry.begin(id);
        registry.complete(id, chat_output("done"));

        let status = *rx.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(status, TaskStatus::Completed);
    }

    #[test]
    fn test_stats_classification() {
        let registry = TaskRegistry::new();
        let a = create_default(&registry);
        let b = create_default(&registry);
        let c = create_default(&registry);
        let _d = create_default(&registry);

        registry.begin(a);
        registry.complete(a, chat_output("ok"));
        registry.begin(b);
        registry.fail(b, "boom".to_string());
        registry.cancel(c);

        let stats = registry.stats();
        assert_eq!(stats.total_submitted, 4);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn test_total_submitted_survives_purge() {
        let registry = TaskRegistry::new();
        let id = create_default(&registry);
        registry.begin(id);
        registry.complete(id, chat_output("ok"));
        std::thread::sleep(Duration::from_millis(5));
        registry.cleanup(Duration::ZERO);

        assert!(registry.get(id).is_none());
        assert_eq!(registry.stats().total_submitted, 1);
        assert_eq!(registry.stats().completed, 0);
    }

    #[test]
    fn test_cleanup_spares_active_and_recent() {
        let registry = TaskRegistry::new();
        let active = create_default(&registry);
        let recent = create_default(&registry);
        registry.begin(recent);
        registry.complete(recent, chat_output("ok"));

        // Generous threshold: the just-completed task survives
        assert_eq!(registry.cleanup(Duration::from_secs(300)), 0);
        assert!(registry.get(active).is_some());
        assert!(registry.get(recent).is_some());

        // Zero threshold: only the active task survives
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.cleanup(Duration::ZERO), 1);
        assert!(registry.get(active).is_some());
        assert!(registry.get(recent).is_none());
    }
}

//! Task model — one outstanding or completed unit of dispatched work.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::llm::{AnalysisResponse, ChatResponse, ProviderKind};

/// Identifier for a dispatched task. Strictly increasing for the lifetime
/// of the process; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ChatCompletion,
    CodeCompletion,
    CodeAnalysis,
    CodeExplanation,
    HealthCheck,
}

/// Task lifecycle state.
///
/// `Pending → InProgress → {Completed, Failed, Cancelled}`; `Cancelled` is
/// also reachable directly from `Pending`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// The payload of a successfully completed task; one variant per
/// [`TaskKind`]. Ownership is automatic — dropping the task drops the
/// payload.
#[derive(Debug, Clone)]
pub enum TaskOutput {
    /// A chat completion.
    Chat(ChatResponse),
    /// A code completion (chat-templated under the hood).
    Completion(ChatResponse),
    /// A code analysis.
    Analysis(AnalysisResponse),
    /// A code explanation (chat-templated under the hood).
    Explanation(ChatResponse),
    /// A provider health probe.
    Health { healthy: bool, latency_ms: u64 },
}

impl TaskOutput {
    /// The task kind this output belongs to.
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutput::Chat(_) => TaskKind::ChatCompletion,
            TaskOutput::Completion(_) => TaskKind::CodeCompletion,
            TaskOutput::Analysis(_) => TaskKind::CodeAnalysis,
            TaskOutput::Explanation(_) => TaskKind::CodeExplanation,
            TaskOutput::Health { .. } => TaskKind::HealthCheck,
        }
    }

    /// The chat response, for the chat-shaped variants.
    pub fn as_chat(&self) -> Option<&ChatResponse> {
        match self {
            TaskOutput::Chat(resp)
            | TaskOutput::Completion(resp)
            | TaskOutput::Explanation(resp) => Some(resp),
            _ => None,
        }
    }
}

/// Per-request options.
///
/// `timeout_ms` is enforced: a provider call that exceeds it fails the task.
/// `retry_count` is carried for callers that implement their own retry
/// policy; the orchestrator never resubmits a failed task on its own.
/// `priority` orders batch admission (higher first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Wall-clock limit for the provider call, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Advisory retry budget for caller-side retry policies.
    pub retry_count: u32,
    /// Batch admission priority (higher first).
    pub priority: u8,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            retry_count: 0,
            priority: 0,
        }
    }
}

impl RequestOptions {
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// One outstanding or completed unit of dispatched work.
///
/// Waiters receive owned snapshots; the live task is mutated only by the
/// worker that dispatched it (and by cancellation). Once terminal, exactly
/// one of `output`/`error_info` is set (`Cancelled` tasks carry neither)
/// and the task never changes again.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique task id.
    pub id: TaskId,
    /// Which backend this task targets.
    pub provider: ProviderKind,
    /// What kind of work this task performs.
    pub kind: TaskKind,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Successful result; present iff `status == Completed`.
    pub output: Option<TaskOutput>,
    /// Failure description; present iff `status == Failed`.
    pub error_info: Option<String>,
    /// When the task was created.
    pub start_time: SystemTime,
    /// When the task reached a terminal state.
    pub completion_time: Option<SystemTime>,
    /// The options the task was submitted with.
    pub options: RequestOptions,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        provider: ProviderKind,
        kind: TaskKind,
        options: RequestOptions,
    ) -> Self {
        Self {
            id,
            provider,
            kind,
            status: TaskStatus::Pending,
            output: None,
            error_info: None,
            start_time: SystemTime::now(),
            completion_time: None,
            options,
        }
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time from creation to terminal state, in milliseconds.
    pub fn completion_time_ms(&self) -> Option<u64> {
        let done = self.completion_time?;
        done.duration_since(self.start_time)
            .ok()
            .map(|d| d.as_millis() as u64)
    }
}

//! Executor abstraction — where worker futures run.
//!
//! The orchestrator is written once against this trait instead of being
//! duplicated per scheduling backend. Two implementations are provided:
//!
//! - [`TokioExecutor`] spawns onto the ambient tokio runtime (the common
//!   case inside an async application).
//! - [`DedicatedExecutor`] owns a private multi-thread runtime, for callers
//!   that want provider I/O isolated on its own worker pool or that have no
//!   ambient runtime at all.

use crate::BoxFuture;

/// A place to run detached worker futures.
pub trait Executor: Send + Sync {
    /// Schedule a future to run to completion in the background.
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}

/// Executor backed by the ambient tokio runtime.
///
/// `spawn` must be called from within a runtime context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }
}

/// Executor backed by a privately owned multi-thread runtime.
///
/// Usable from synchronous contexts; dropping it shuts the pool down in
/// the background without waiting for in-flight work.
pub struct DedicatedExecutor {
    runtime: Option<tokio::runtime::Runtime>,
}

impl DedicatedExecutor {
    /// Create a pool with the given number of worker threads.
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("quorum-worker")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }
}

impl Executor for DedicatedExecutor {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        if let Some(ref runtime) = self.runtime {
            runtime.spawn(fut);
        }
    }
}

impl Drop for DedicatedExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tokio_executor_runs_future() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        TokioExecutor.spawn(Box::pin(async move {
            let _ = tx.send(42u32);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[test]
    fn test_dedicated_executor_runs_without_ambient_runtime() {
        let executor = DedicatedExecutor::new(2).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        executor.spawn(Box::pin(async move {
            let _ = tx.send("done");
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "done");
    }

    #[test]
    fn test_dedicated_executor_clamps_zero_threads() {
        // worker_threads(0) would panic in tokio; the constructor clamps
        let executor = DedicatedExecutor::new(0).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        executor.spawn(Box::pin(async move {
            let _ = tx.send(());
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}

#![deny(unsafe_code)]

//! Quorum core — a concurrent multi-provider request orchestrator.
//!
//! The library dispatches the same logical LLM request across
//! interchangeable backends: single fire-and-poll submissions, batches
//! bounded by a counting semaphore, races (first success wins, the rest
//! are cancelled), and broadcasts (collect every success). A two-tier
//! content-addressed response cache sits in front of the network.
//!
//! Providers are consumed through the [`llm::ProviderClient`] capability;
//! the orchestrator never speaks HTTP itself.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future — the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits (stable since Rust 1.75) produces opaque return
/// types that are **not** object-safe. Traits consumed via `Box<dyn Trait>` or
/// `&dyn Trait` must return a concrete `Pin<Box<dyn Future>>` instead. This
/// alias keeps those signatures readable.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Two-tier content-addressed response cache.
pub mod cache;
/// Provider health tracking and candidate selection.
pub mod health;
/// LLM provider trait, shared types, and the backend adapters.
pub mod llm;
/// Task registry, worker dispatch, and the orchestrator API.
pub mod orchestrator;

pub use cache::ResponseCache;
pub use health::{ProviderHealth, ProviderManager};
pub use llm::{ProviderClient, ProviderKind};
pub use orchestrator::{
    BatchOptions, BatchRequest, DedicatedExecutor, Executor, Orchestrator, OrchestratorError,
    RequestOptions, Task, TaskId, TaskKind, TaskStatus, TokioExecutor,
};

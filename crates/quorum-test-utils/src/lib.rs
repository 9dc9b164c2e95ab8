#![deny(unsafe_code)]

//! Shared test utilities for the Quorum workspace.
//!
//! Provides reusable fixtures, config builders, scripted mock providers,
//! and tracing helpers so that individual crate tests stay concise and
//! consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! quorum-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod providers;
pub mod tracing_setup;

pub use providers::{MockProbe, MockProvider};

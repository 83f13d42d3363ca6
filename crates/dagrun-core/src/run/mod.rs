//! Run execution: walks a validated graph and drives one tracker per action.
//!
//! - `context` -- shared collaborators for a run (store, hasher, sinks)
//! - `retry` -- exponential backoff for transient store failures
//! - `cache` -- cache keys over action identity and input versions
//! - `runner` -- `ActionRunner`, wave-based execution with skip decisions

pub mod cache;
pub mod context;
pub mod retry;
pub mod runner;

pub use context::RunContext;
pub use retry::RetryPolicy;
pub use runner::{ActionRunner, ExecutionError, RunOptions, RunnerError};

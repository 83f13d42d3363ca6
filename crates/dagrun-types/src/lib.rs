//! Shared domain types for dagrun.
//!
//! This crate contains the plain data passed between the graph, the runner,
//! the tracker and the storage adapters: artifact records, object locations,
//! action and run status, run reports, run events and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod action;
pub mod artifact;
pub mod config;
pub mod error;
pub mod event;
pub mod run;

//! Filesystem persistence: artifact objects and run reports.

pub mod local;
pub mod run_log;

pub use local::LocalObjectStore;
pub use run_log::JsonRunLog;

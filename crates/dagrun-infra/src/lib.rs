//! Infrastructure layer for dagrun.
//!
//! Contains implementations of the ports defined in `dagrun-core`: the local
//! filesystem object store, SHA-256 content hashing, the JSON-lines metrics
//! sink, persisted run reports, and the configuration loader.

pub mod config;
pub mod crypto;
pub mod metrics;
pub mod storage;

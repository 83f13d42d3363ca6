//! Action graph model and execution protocol for dagrun.
//!
//! This crate defines the ports (artifact store, content hasher, metrics sink)
//! that the infrastructure layer implements, plus the graph, tracker and
//! runner built on top of them. It depends only on `dagrun-types` -- never on
//! `dagrun-infra` or any filesystem backend.

pub mod action;
pub mod artifact;
pub mod event;
pub mod graph;
pub mod hash;
pub mod metrics;
pub mod run;

#[cfg(test)]
pub(crate) mod testing;

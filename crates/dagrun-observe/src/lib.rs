//! Observability setup for dagrun.
//!
//! - `tracing_setup` -- global subscriber (fmt, env filter, optional JSON and
//!   OpenTelemetry export)
//! - `attrs` -- span attribute names shared by the binary's run spans

pub mod attrs;
pub mod tracing_setup;

pub use tracing_setup::{TracingOptions, init_tracing, shutdown_tracing, verbosity_filter};

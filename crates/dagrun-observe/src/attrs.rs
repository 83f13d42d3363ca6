//! Span attribute names for pipeline runs.
//!
//! Usable with `Span::record` on spans that declare the field up front
//! (`tracing::field::Empty`). Span naming convention: `"dagrun.run {project}"`.

// --- Run attributes ---

/// Project name of the pipeline being run.
pub const RUN_PROJECT: &str = "dagrun.project";

/// Run id (UUID v7).
pub const RUN_ID: &str = "dagrun.run.id";

/// Final run status (`succeeded`, `failed`, `cancelled`).
pub const RUN_STATUS: &str = "dagrun.run.status";

/// Number of actions in the graph.
pub const RUN_ACTIONS: &str = "dagrun.run.actions";

// --- Outcome counters ---

pub const RUN_SUCCEEDED: &str = "dagrun.run.succeeded";
pub const RUN_CACHED: &str = "dagrun.run.cached";
pub const RUN_FAILED: &str = "dagrun.run.failed";

/// Wall-clock duration of the run in milliseconds.
pub const RUN_DURATION_MS: &str = "dagrun.run.duration_ms";

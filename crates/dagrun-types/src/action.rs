//! Action identity and execution status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable identity of an action, captured when it is registered in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionMeta {
    /// Stable, graph-unique action name.
    pub name: String,
    /// Category label (e.g. "ingest-dataset", "train-model").
    pub job_type: String,
    /// Logical grouping for related jobs (e.g. "model").
    pub job_group: String,
}

impl ActionMeta {
    pub fn new(
        name: impl Into<String>,
        job_type: impl Into<String>,
        job_group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            job_type: job_type.into(),
            job_group: job_group.into(),
        }
    }
}

impl fmt::Display for ActionMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.job_group, self.job_type)
    }
}

/// Why an action was not executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Every output already exists for the exact same cache key.
    CacheHit,
    /// An ancestor failed; `action` names the failed ancestor.
    UpstreamFailed { action: String },
    /// The run was cancelled before this action started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::CacheHit => write!(f, "cache hit"),
            SkipReason::UpstreamFailed { action } => write!(f, "blocked by failed '{action}'"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-action state machine: `Pending -> Running -> {Succeeded, Failed, Skipped}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped { reason: SkipReason },
}

impl ActionStatus {
    pub fn skipped(reason: SkipReason) -> Self {
        ActionStatus::Skipped { reason }
    }

    /// Whether the action has reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending | ActionStatus::Running)
    }

    /// Whether children of this action may start.
    ///
    /// Only a success or a cache hit publishes outputs that dependents can read.
    pub fn unblocks_dependents(&self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded
                | ActionStatus::Skipped {
                    reason: SkipReason::CacheHit
                }
        )
    }

    /// Short lowercase label used in tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed => "failed",
            ActionStatus::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Skipped { reason } => write!(f, "skipped ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

impl Default for ActionStatus {
    fn default() -> Self {
        ActionStatus::Pending
    }
}

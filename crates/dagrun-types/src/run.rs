//! Run reports: the machine-readable per-action status table of one run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{ActionStatus, SkipReason};
use crate::artifact::ArtifactRef;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal record for one action in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub name: String,
    pub job_type: String,
    pub job_group: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifact versions the action declared as inputs (or consumed via cache).
    #[serde(default)]
    pub inputs: Vec<ArtifactRef>,
    /// Artifact versions the action published or propagated from cache.
    #[serde(default)]
    pub outputs: Vec<ArtifactRef>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Final report of one run of an action graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub project: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// One entry per action, in topological order.
    pub actions: Vec<ActionReport>,
}

/// Count of actions per terminal outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub cached: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl RunReport {
    /// Look up an action's report by name.
    pub fn action(&self, name: &str) -> Option<&ActionReport> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for action in &self.actions {
            match &action.status {
                ActionStatus::Succeeded => counts.succeeded += 1,
                ActionStatus::Failed => counts.failed += 1,
                ActionStatus::Skipped { reason } => match reason {
                    SkipReason::CacheHit => counts.cached += 1,
                    SkipReason::UpstreamFailed { .. } => counts.blocked += 1,
                    SkipReason::Cancelled => counts.cancelled += 1,
                },
                ActionStatus::Pending | ActionStatus::Running => {}
            }
        }
        counts
    }

    /// Every artifact version produced or propagated during the run.
    pub fn artifacts(&self) -> Vec<&ArtifactRef> {
        self.actions.iter().flat_map(|a| a.outputs.iter()).collect()
    }

    /// Wall-clock duration when the run has completed.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, status: ActionStatus) -> ActionReport {
        ActionReport {
            name: name.to_string(),
            job_type: "test".to_string(),
            job_group: "group".to_string(),
            status,
            error: None,
            inputs: vec![],
            outputs: vec![ArtifactRef::new(format!("{name}-out"), "v1")],
            metrics: BTreeMap::new(),
            cache_key: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_counts_and_lookup() {
        let run = RunReport {
            run_id: Uuid::nil(),
            project: "demo".to_string(),
            status: RunStatus::Failed,
            started_at: Utc::now(),
            completed_at: None,
            actions: vec![
                report("ingest", ActionStatus::skipped(SkipReason::CacheHit)),
                report("train", ActionStatus::Failed),
                report(
                    "eval",
                    ActionStatus::skipped(SkipReason::UpstreamFailed {
                        action: "train".to_string(),
                    }),
                ),
            ],
        };

        let counts = run.counts();
        assert_eq!(counts.cached, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.blocked, 1);
        assert_eq!(counts.succeeded, 0);
        assert!(!run.is_success());
        assert_eq!(run.action("train").unwrap().status, ActionStatus::Failed);
        assert!(run.action("missing").is_none());
        assert_eq!(run.artifacts().len(), 3);
        assert!(run.duration_ms().is_none());
    }

    #[test]
    fn test_run_status_serde() {
        let json = serde_json::to_string(&RunStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
    }
}

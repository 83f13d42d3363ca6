//! Events emitted while a run executes.
//!
//! Published on the core event bus so that CLIs, dashboards or tests can
//! follow a run without polling the report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionStatus;
use crate::artifact::ArtifactRef;
use crate::run::RunStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        project: String,
        actions: usize,
    },
    ActionStarted {
        run_id: Uuid,
        action: String,
    },
    ActionFinished {
        run_id: Uuid,
        action: String,
        status: ActionStatus,
        duration_ms: u64,
    },
    ArtifactPublished {
        run_id: Uuid,
        action: String,
        artifact: ArtifactRef,
        /// False when an identical version already existed.
        created: bool,
    },
    MetricsLogged {
        run_id: Uuid,
        action: String,
        metrics: BTreeMap<String, f64>,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::ActionStarted { run_id, .. }
            | RunEvent::ActionFinished { run_id, .. }
            | RunEvent::ArtifactPublished { run_id, .. }
            | RunEvent::MetricsLogged { run_id, .. }
            | RunEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}

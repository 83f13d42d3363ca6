//! Action runner: wave-based execution of a validated action graph.
//!
//! The `ActionRunner` walks the graph's dependency waves. Within a wave up to
//! `max_parallel` actions run concurrently via `tokio::JoinSet`, started in
//! topological order. Every action gets a fresh `Tracker` whose view of
//! earlier outputs is a snapshot taken at the wave barrier, so a producer's
//! publication always happens-before its consumers start.
//!
//! # Execution flow
//!
//! 1. Validate the graph and prepare the scratch directory.
//! 2. For each wave, settle blocked actions (failed or cancelled ancestors).
//! 3. Derive each remaining action's cache key from its resolved inputs and
//!    skip it when a cache entry matches and all its outputs still exist.
//! 4. Spawn the rest, collect outcomes, record cache entries for successes.
//! 5. Assemble the per-action status table into a `RunReport`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dagrun_types::action::{ActionStatus, SkipReason};
use dagrun_types::artifact::{ArtifactRecord, ArtifactRef, CacheEntry};
use dagrun_types::config::DagrunConfig;
use dagrun_types::event::RunEvent;
use dagrun_types::run::{ActionReport, RunReport, RunStatus};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::action::ActionDyn;
use crate::artifact::tracker::{Tracker, TrackerSession};
use crate::event::EventBus;
use crate::graph::dag::{ActionGraph, ActionId, ActionNode, GraphError};

use super::cache::cache_key;
use super::context::RunContext;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why one action did not succeed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("action '{action}' failed: {source:#}")]
    ActionFailed {
        action: String,
        source: anyhow::Error,
    },

    #[error("action '{action}' timed out after {}ms", .after.as_millis())]
    TimedOut { action: String, after: Duration },

    #[error("action '{action}' panicked: {message}")]
    Panicked { action: String, message: String },

    #[error("action '{action}' finished without publishing: {}", .missing.join(", "))]
    MissingOutputs {
        action: String,
        missing: Vec<String>,
    },
}

impl ExecutionError {
    pub fn action(&self) -> &str {
        match self {
            ExecutionError::ActionFailed { action, .. }
            | ExecutionError::TimedOut { action, .. }
            | ExecutionError::Panicked { action, .. }
            | ExecutionError::MissingOutputs { action, .. } => action,
        }
    }
}

/// Errors returned before anything executes.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid action graph: {0}")]
    Graph(#[from] GraphError),

    #[error("cannot prepare scratch dir '{}': {source}", .path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip actions whose cache entry matches.
    pub caching: bool,
    /// Actions running concurrently within one wave (at least 1).
    pub max_parallel: usize,
    pub action_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            caching: true,
            max_parallel: 1,
            action_timeout: None,
        }
    }
}

impl From<&DagrunConfig> for RunOptions {
    fn from(config: &DagrunConfig) -> Self {
        Self {
            caching: config.caching,
            max_parallel: config.max_parallel.max(1),
            action_timeout: config.action_timeout_secs.map(Duration::from_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

struct RunState {
    reports: HashMap<ActionId, ActionReport>,
    /// Versions produced or propagated so far, by artifact name.
    resolved: HashMap<String, ArtifactRecord>,
}

impl RunState {
    fn new(graph: &ActionGraph) -> Self {
        let reports = graph
            .nodes()
            .map(|node| {
                let meta = node.meta();
                let report = ActionReport {
                    name: meta.name.clone(),
                    job_type: meta.job_type.clone(),
                    job_group: meta.job_group.clone(),
                    status: ActionStatus::Pending,
                    error: None,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    metrics: Default::default(),
                    cache_key: None,
                    duration_ms: 0,
                };
                (node.id().clone(), report)
            })
            .collect();
        Self {
            reports,
            resolved: HashMap::new(),
        }
    }

    fn status(&self, id: &ActionId) -> Option<&ActionStatus> {
        self.reports.get(id).map(|r| &r.status)
    }

    /// Reason an action cannot start, judged from its parents' final states.
    fn blocked_reason(&self, node: &ActionNode) -> Option<SkipReason> {
        let mut cancelled = false;
        for parent in node.parents() {
            match self.status(parent) {
                Some(status) if status.unblocks_dependents() => {}
                Some(ActionStatus::Failed) => {
                    return Some(SkipReason::UpstreamFailed {
                        action: parent.to_string(),
                    });
                }
                Some(ActionStatus::Skipped {
                    reason: SkipReason::UpstreamFailed { action },
                }) => {
                    return Some(SkipReason::UpstreamFailed {
                        action: action.clone(),
                    });
                }
                _ => cancelled = true,
            }
        }
        cancelled.then_some(SkipReason::Cancelled)
    }

    /// Exact input versions for an action, or `None` when one is unresolved.
    fn input_refs(&self, node: &ActionNode) -> Option<Vec<ArtifactRef>> {
        node.io()
            .inputs
            .iter()
            .map(|name| self.resolved.get(name).map(ArtifactRecord::artifact_ref))
            .collect()
    }

    fn report_mut(&mut self, id: &ActionId) -> Option<&mut ActionReport> {
        self.reports.get_mut(id)
    }
}

/// Outcome of one spawned action.
enum TaskOutcome {
    Finished {
        session: TrackerSession,
        result: Result<(), ExecutionError>,
        duration_ms: u64,
    },
    Cancelled,
}

/// An action cleared to run, waiting for a slot.
struct Pending {
    id: ActionId,
    cache_key: Option<String>,
}

// ---------------------------------------------------------------------------
// ActionRunner
// ---------------------------------------------------------------------------

/// Executes a validated graph to completion.
pub struct ActionRunner {
    graph: ActionGraph,
    ctx: RunContext,
    options: RunOptions,
    project: String,
    cancel: CancellationToken,
}

impl ActionRunner {
    /// Validate the graph and build a runner with default options.
    pub fn new(graph: ActionGraph, ctx: RunContext) -> Result<Self, RunnerError> {
        graph.validate()?;
        Ok(Self {
            graph,
            ctx,
            options: RunOptions::default(),
            project: "default".to_string(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Run under an externally owned token, e.g. one shared with a signal
    /// handler or with the actions themselves.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn graph(&self) -> &ActionGraph {
        &self.graph
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Token that cancels the run: in-flight actions finish, queued ones are
    /// skipped.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn events(&self) -> &EventBus {
        self.ctx.events()
    }

    /// Execute every action once and report per-action outcomes.
    ///
    /// Action failures do not make this return `Err`; they are reported in
    /// the `RunReport`.
    pub async fn run(&self) -> Result<RunReport, RunnerError> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let run_start = Instant::now();

        let scratch = self.ctx.scratch_dir();
        tokio::fs::create_dir_all(scratch)
            .await
            .map_err(|source| RunnerError::Scratch {
                path: scratch.to_path_buf(),
                source,
            })?;
        let order = self.graph.toposort()?;
        let waves = self.graph.layers()?;

        let mut state = RunState::new(&self.graph);
        self.ctx.events().publish(RunEvent::RunStarted {
            run_id,
            project: self.project.clone(),
            actions: order.len(),
        });
        tracing::info!(
            run_id = %run_id,
            project = self.project.as_str(),
            actions = order.len(),
            waves = waves.len(),
            caching = self.options.caching,
            "starting run"
        );

        for (wave_idx, wave) in waves.iter().enumerate() {
            tracing::debug!(run_id = %run_id, wave = wave_idx, actions = wave.len(), "processing wave");
            let queue = self.prepare_wave(run_id, wave, &mut state).await;
            self.execute_wave(run_id, queue, &mut state).await;
        }

        let actions: Vec<ActionReport> = order
            .iter()
            .filter_map(|id| state.reports.remove(id))
            .collect();
        let status = if actions.iter().any(|a| a.status == ActionStatus::Failed) {
            RunStatus::Failed
        } else if actions
            .iter()
            .any(|a| a.status == ActionStatus::skipped(SkipReason::Cancelled))
        {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        };

        let duration_ms = run_start.elapsed().as_millis() as u64;
        self.ctx.events().publish(RunEvent::RunFinished {
            run_id,
            status,
            duration_ms,
        });
        let report = RunReport {
            run_id,
            project: self.project.clone(),
            status,
            started_at,
            completed_at: Some(Utc::now()),
            actions,
        };
        let counts = report.counts();
        tracing::info!(
            run_id = %run_id,
            status = %status,
            succeeded = counts.succeeded,
            cached = counts.cached,
            failed = counts.failed,
            blocked = counts.blocked,
            cancelled = counts.cancelled,
            duration_ms,
            "run finished"
        );
        Ok(report)
    }

    /// Settle blocked and cached actions of a wave; return the ones to execute.
    async fn prepare_wave(
        &self,
        run_id: Uuid,
        wave: &[ActionId],
        state: &mut RunState,
    ) -> VecDeque<Pending> {
        let mut queue = VecDeque::with_capacity(wave.len());
        for id in wave {
            let Some(node) = self.graph.get(id) else {
                continue;
            };

            if let Some(reason) = state.blocked_reason(node) {
                tracing::warn!(run_id = %run_id, action = %id, reason = %reason, "skipping action");
                self.finish(run_id, state, id, ActionStatus::skipped(reason), 0);
                continue;
            }

            if self.cancel.is_cancelled() {
                tracing::info!(run_id = %run_id, action = %id, "run cancelled, skipping action");
                self.finish(run_id, state, id, ActionStatus::skipped(SkipReason::Cancelled), 0);
                continue;
            }

            let inputs = state.input_refs(node);
            let key = inputs.as_ref().map(|inputs| {
                cache_key(self.ctx.hasher(), node.meta(), node.code_version(), inputs)
            });
            if let Some(report) = state.report_mut(id) {
                report.cache_key = key.clone();
                report.inputs = inputs.unwrap_or_default();
            }

            if self.options.caching {
                if let Some(key) = key.as_deref() {
                    if let Some(records) = self.cached_outputs(key, node).await {
                        tracing::info!(
                            run_id = %run_id,
                            action = %id,
                            cache_key = dagrun_types::artifact::short_version(key),
                            "cache hit, skipping action"
                        );
                        if let Some(report) = state.report_mut(id) {
                            report.outputs = records.iter().map(ArtifactRecord::artifact_ref).collect();
                        }
                        for record in records {
                            state.resolved.insert(record.name.clone(), record);
                        }
                        self.finish(run_id, state, id, ActionStatus::skipped(SkipReason::CacheHit), 0);
                        continue;
                    }
                }
            }

            queue.push_back(Pending {
                id: id.clone(),
                cache_key: key,
            });
        }
        queue
    }

    /// Outputs of a matching cache entry, when every one is still committed.
    async fn cached_outputs(&self, key: &str, node: &ActionNode) -> Option<Vec<ArtifactRecord>> {
        let store = self.ctx.store();
        let retry = self.ctx.retry();
        let entry = match retry.run("lookup_cache", move || store.lookup_cache(key)).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(action = %node.id(), error = %err, "cache lookup failed, running action");
                return None;
            }
        };

        let mut records = Vec::with_capacity(node.io().outputs.len());
        for name in &node.io().outputs {
            let artifact = entry.outputs.iter().find(|o| &o.name == name)?;
            match retry.run("get_record", move || store.get_record(artifact)).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    tracing::debug!(
                        action = %node.id(),
                        artifact = %artifact,
                        "cached output no longer exists"
                    );
                    return None;
                }
                Err(err) => {
                    tracing::warn!(action = %node.id(), error = %err, "cache check failed, running action");
                    return None;
                }
            }
        }
        Some(records)
    }

    /// Run queued actions with at most `max_parallel` in flight.
    async fn execute_wave(&self, run_id: Uuid, mut queue: VecDeque<Pending>, state: &mut RunState) {
        let max_parallel = self.options.max_parallel.max(1);
        let snapshot = Arc::new(state.resolved.clone());
        let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, Pending> = HashMap::new();

        loop {
            while join_set.len() < max_parallel {
                let Some(pending) = queue.pop_front() else {
                    break;
                };
                if self.cancel.is_cancelled() {
                    tracing::info!(run_id = %run_id, action = %pending.id, "run cancelled, skipping action");
                    self.finish(run_id, state, &pending.id, ActionStatus::skipped(SkipReason::Cancelled), 0);
                    continue;
                }
                let Some(node) = self.graph.get(&pending.id) else {
                    continue;
                };
                if let Some(report) = state.report_mut(&pending.id) {
                    report.status = ActionStatus::Running;
                }
                let handle = join_set.spawn(self.spawn_action(run_id, node, Arc::clone(&snapshot)));
                in_flight.insert(handle.id(), pending);
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            match joined {
                Ok((task_id, outcome)) => {
                    if let Some(pending) = in_flight.remove(&task_id) {
                        self.settle(run_id, state, pending, outcome).await;
                    }
                }
                Err(join_err) => {
                    let Some(pending) = in_flight.remove(&join_err.id()) else {
                        continue;
                    };
                    let message = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        "task aborted".to_string()
                    };
                    let err = ExecutionError::Panicked {
                        action: pending.id.to_string(),
                        message,
                    };
                    tracing::error!(run_id = %run_id, action = %pending.id, error = %err, "action failed");
                    if let Some(report) = state.report_mut(&pending.id) {
                        report.error = Some(err.to_string());
                    }
                    self.finish(run_id, state, &pending.id, ActionStatus::Failed, 0);
                }
            }
        }
    }

    fn spawn_action(
        &self,
        run_id: Uuid,
        node: &ActionNode,
        snapshot: Arc<HashMap<String, ArtifactRecord>>,
    ) -> impl std::future::Future<Output = TaskOutcome> + Send + 'static {
        let action = node.action();
        let name = node.id().to_string();
        let expected = node.io().outputs.clone();
        let tracker = Tracker::new(
            self.ctx.clone(),
            run_id,
            node.meta().clone(),
            node.io().clone(),
            snapshot,
        );
        let token = self.cancel.clone();
        let events = self.ctx.events().clone();
        let timeout = self.options.action_timeout;
        let span = tracing::info_span!("action", run_id = %run_id, action = name.as_str());

        async move {
            if token.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            events.publish(RunEvent::ActionStarted {
                run_id,
                action: name.clone(),
            });
            tracing::info!("action started");

            let started = Instant::now();
            let mut tracker = tracker;
            let mut result = execute(action.as_ref(), &mut tracker, timeout, &name).await;
            if result.is_ok() {
                let missing: Vec<String> = expected
                    .into_iter()
                    .filter(|output| !tracker.declared_outputs().iter().any(|r| &r.name == output))
                    .collect();
                if !missing.is_empty() {
                    result = Err(ExecutionError::MissingOutputs {
                        action: name.clone(),
                        missing,
                    });
                }
            }

            TaskOutcome::Finished {
                session: tracker.into_session(),
                result,
                duration_ms: started.elapsed().as_millis() as u64,
            }
        }
        .instrument(span)
    }

    /// Apply one task outcome to the run state.
    async fn settle(&self, run_id: Uuid, state: &mut RunState, pending: Pending, outcome: TaskOutcome) {
        let id = pending.id;
        let (session, result, duration_ms) = match outcome {
            TaskOutcome::Cancelled => {
                self.finish(run_id, state, &id, ActionStatus::skipped(SkipReason::Cancelled), 0);
                return;
            }
            TaskOutcome::Finished {
                session,
                result,
                duration_ms,
            } => (session, result, duration_ms),
        };

        let outputs: Vec<ArtifactRef> = session
            .outputs
            .iter()
            .map(ArtifactRecord::artifact_ref)
            .collect();
        if let Some(report) = state.report_mut(&id) {
            report.inputs = session.inputs.clone();
            report.outputs = outputs.clone();
            report.metrics = session.metrics.clone();
        }

        match result {
            Ok(()) => {
                for record in session.outputs {
                    state.resolved.insert(record.name.clone(), record);
                }
                if let Some(key) = pending.cache_key {
                    self.record_cache(run_id, &id, key, outputs).await;
                }
                self.finish(run_id, state, &id, ActionStatus::Succeeded, duration_ms);
            }
            Err(err) => {
                tracing::error!(run_id = %run_id, action = %id, error = %err, "action failed");
                if let Some(report) = state.report_mut(&id) {
                    report.error = Some(err.to_string());
                }
                self.finish(run_id, state, &id, ActionStatus::Failed, duration_ms);
            }
        }
    }

    async fn record_cache(&self, run_id: Uuid, id: &ActionId, key: String, outputs: Vec<ArtifactRef>) {
        let entry = CacheEntry {
            key,
            action: id.to_string(),
            outputs,
            run_id,
            created_at: Utc::now(),
        };
        let store = self.ctx.store();
        let entry_ref = &entry;
        if let Err(err) = self
            .ctx
            .retry()
            .run("record_cache", move || store.record_cache(entry_ref))
            .await
        {
            tracing::warn!(run_id = %run_id, action = %id, error = %err, "failed to record cache entry");
        }
    }

    /// Set a terminal status and announce it.
    fn finish(&self, run_id: Uuid, state: &mut RunState, id: &ActionId, status: ActionStatus, duration_ms: u64) {
        if let Some(report) = state.report_mut(id) {
            report.status = status.clone();
            report.duration_ms = duration_ms;
        }
        tracing::debug!(run_id = %run_id, action = %id, status = %status, duration_ms, "action finished");
        self.ctx.events().publish(RunEvent::ActionFinished {
            run_id,
            action: id.to_string(),
            status,
            duration_ms,
        });
    }
}

impl std::fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRunner")
            .field("project", &self.project)
            .field("actions", &self.graph.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

async fn execute(
    action: &dyn ActionDyn,
    tracker: &mut Tracker,
    timeout: Option<Duration>,
    name: &str,
) -> Result<(), ExecutionError> {
    let run = action.run_boxed(tracker);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(ExecutionError::TimedOut {
                    action: name.to_string(),
                    after: limit,
                });
            }
        },
        None => run.await,
    };
    outcome.map_err(|source| ExecutionError::ActionFailed {
        action: name.to_string(),
        source,
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::artifact::ArtifactStore;
    use crate::artifact::memory::InMemoryArtifactStore;
    use crate::artifact::tracker::OutputSpec;
    use crate::metrics::InMemoryMetricsSink;
    use crate::testing::{FailAction, WriteAction, location, test_context};
    use dagrun_types::artifact::ArtifactType;
    use tempfile::TempDir;

    struct EvalAction {
        version: &'static str,
    }

    impl Action for EvalAction {
        fn name(&self) -> &str {
            "eval"
        }

        fn job_type(&self) -> &str {
            "evaluate"
        }

        fn outputs(&self) -> Vec<String> {
            vec!["predictions".to_string()]
        }

        fn code_version(&self) -> &str {
            self.version
        }

        async fn run(&self, tracker: &mut Tracker) -> anyhow::Result<()> {
            let data = tracker.declare_input("dataset").await?;
            let model = tracker.declare_input("model").await?;
            let out = tracker.work_dir().await?.join("predictions.csv");
            tokio::fs::write(&out, format!("{}:{}", data.len(), model.len())).await?;
            tracker
                .declare_output(
                    OutputSpec::new("predictions", ArtifactType::Predictions, location()).file(out),
                )
                .await?;
            tracker.log([("mse", 0.5), ("mae", 0.25)]);
            Ok(())
        }
    }

    struct SlowAction;

    impl Action for SlowAction {
        fn job_type(&self) -> &str {
            "slow"
        }

        fn outputs(&self) -> Vec<String> {
            Vec::new()
        }

        async fn run(&self, _tracker: &mut Tracker) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    struct PanicAction;

    impl Action for PanicAction {
        fn job_type(&self) -> &str {
            "panic"
        }

        fn outputs(&self) -> Vec<String> {
            Vec::new()
        }

        async fn run(&self, _tracker: &mut Tracker) -> anyhow::Result<()> {
            panic!("kaboom")
        }
    }

    /// Action that forgets to publish its declared output.
    struct LazyAction;

    impl Action for LazyAction {
        fn job_type(&self) -> &str {
            "lazy"
        }

        fn outputs(&self) -> Vec<String> {
            vec!["never".to_string()]
        }

        async fn run(&self, _tracker: &mut Tracker) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        _tmp: TempDir,
        store: InMemoryArtifactStore,
        metrics: Arc<InMemoryMetricsSink>,
        ctx: RunContext,
    }

    fn harness() -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryArtifactStore::new();
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let ctx = test_context(tmp.path().join("scratch"), store.clone(), metrics.clone());
        Harness {
            _tmp: tmp,
            store,
            metrics,
            ctx,
        }
    }

    /// ingest -> train -> eval, with eval also depending on ingest.
    fn pipeline(eval_version: &'static str, fail_train: bool) -> ActionGraph {
        let mut graph = ActionGraph::new();
        let ingest = graph
            .add(WriteAction::new("ingest", vec!["dataset"]), &[])
            .unwrap();
        let train = if fail_train {
            graph
                .add(
                    FailAction {
                        name: "train",
                        outputs: vec!["model"],
                    },
                    &[ingest.clone()],
                )
                .unwrap()
        } else {
            graph
                .add(WriteAction::new("train", vec!["model"]), &[ingest.clone()])
                .unwrap()
        };
        graph
            .add(
                EvalAction {
                    version: eval_version,
                },
                &[ingest, train],
            )
            .unwrap();
        graph
    }

    fn status(report: &RunReport, name: &str) -> ActionStatus {
        report.action(name).unwrap().status.clone()
    }

    #[tokio::test]
    async fn test_pipeline_produces_three_artifacts_and_eval_metrics() {
        let h = harness();
        let runner = ActionRunner::new(pipeline("1", false), h.ctx.clone()).unwrap();
        let report = runner.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        let names: Vec<&str> = report.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["ingest", "train", "eval"]);
        assert!(report.actions.iter().all(|a| a.status == ActionStatus::Succeeded));

        assert_eq!(
            h.store.list_names().await.unwrap(),
            vec!["dataset", "model", "predictions"]
        );
        assert_eq!(h.store.version_count(), 3);

        let records = h.metrics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "eval");
        assert_eq!(report.action("eval").unwrap().metrics["mse"], 0.5);

        let eval = report.action("eval").unwrap();
        let inputs: Vec<&str> = eval.inputs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(inputs, vec!["dataset", "model"]);
        assert!(eval.cache_key.is_some());
    }

    #[tokio::test]
    async fn test_failed_train_blocks_eval_and_keeps_dataset() {
        let h = harness();
        let runner = ActionRunner::new(pipeline("1", true), h.ctx.clone()).unwrap();
        let report = runner.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(status(&report, "ingest"), ActionStatus::Succeeded);
        assert_eq!(status(&report, "train"), ActionStatus::Failed);
        assert_eq!(
            status(&report, "eval"),
            ActionStatus::skipped(SkipReason::UpstreamFailed {
                action: "train".to_string()
            })
        );
        assert!(report.action("train").unwrap().error.as_ref().unwrap().contains("boom"));

        let dataset = h.store.latest("dataset").await.unwrap().unwrap();
        assert_eq!(report.action("ingest").unwrap().outputs, vec![dataset.artifact_ref()]);
        assert!(h.store.latest("model").await.unwrap().is_none());
        assert!(h.metrics.records().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_skips_cached_and_reruns_changed_code() {
        let h = harness();
        let first = ActionRunner::new(pipeline("1", false), h.ctx.clone())
            .unwrap()
            .run()
            .await
            .unwrap();
        assert!(first.is_success());

        let second = ActionRunner::new(pipeline("2", false), h.ctx.clone())
            .unwrap()
            .run()
            .await
            .unwrap();
        let cache_hit = ActionStatus::skipped(SkipReason::CacheHit);
        assert_eq!(status(&second, "ingest"), cache_hit);
        assert_eq!(status(&second, "train"), cache_hit);
        assert_eq!(status(&second, "eval"), ActionStatus::Succeeded);
        assert_eq!(second.status, RunStatus::Succeeded);

        // Cached outputs propagate the exact versions of the first run.
        assert_eq!(
            second.action("train").unwrap().outputs,
            first.action("train").unwrap().outputs
        );
        assert_eq!(
            second.action("eval").unwrap().inputs,
            first.action("eval").unwrap().inputs
        );

        let third = ActionRunner::new(pipeline("2", false), h.ctx.clone())
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(third.counts().cached, 3);
    }

    #[tokio::test]
    async fn test_caching_disabled_reruns_everything() {
        let h = harness();
        ActionRunner::new(pipeline("1", false), h.ctx.clone())
            .unwrap()
            .run()
            .await
            .unwrap();
        let report = ActionRunner::new(pipeline("1", false), h.ctx.clone())
            .unwrap()
            .with_options(RunOptions {
                caching: false,
                ..RunOptions::default()
            })
            .run()
            .await
            .unwrap();
        assert_eq!(report.counts().succeeded, 3);
        assert_eq!(h.store.version_count(), 3, "identical content, no new versions");
    }

    #[tokio::test]
    async fn test_independent_branch_continues_after_failure() {
        let h = harness();
        let mut graph = ActionGraph::new();
        let bad = graph
            .add(
                FailAction {
                    name: "bad",
                    outputs: vec!["b"],
                },
                &[],
            )
            .unwrap();
        graph.add(WriteAction::new("after_bad", vec!["c"]), &[bad]).unwrap();
        let good = graph.add(WriteAction::new("good", vec!["g"]), &[]).unwrap();
        graph.add(WriteAction::new("after_good", vec!["h"]), &[good]).unwrap();

        let report = ActionRunner::new(graph, h.ctx.clone())
            .unwrap()
            .with_options(RunOptions {
                max_parallel: 2,
                ..RunOptions::default()
            })
            .run()
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(status(&report, "good"), ActionStatus::Succeeded);
        assert_eq!(status(&report, "after_good"), ActionStatus::Succeeded);
        assert_eq!(
            status(&report, "after_bad"),
            ActionStatus::skipped(SkipReason::UpstreamFailed {
                action: "bad".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_blocked_reason_names_root_failure() {
        let h = harness();
        let mut graph = ActionGraph::new();
        let a = graph
            .add(
                FailAction {
                    name: "a",
                    outputs: vec!["A"],
                },
                &[],
            )
            .unwrap();
        let b = graph.add(WriteAction::new("b", vec!["B"]), &[a]).unwrap();
        graph.add(WriteAction::new("c", vec!["C"]), &[b]).unwrap();

        let report = ActionRunner::new(graph, h.ctx.clone()).unwrap().run().await.unwrap();
        assert_eq!(
            status(&report, "c"),
            ActionStatus::skipped(SkipReason::UpstreamFailed {
                action: "a".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_queued_actions() {
        let h = harness();
        let runner = ActionRunner::new(pipeline("1", false), h.ctx.clone()).unwrap();
        runner.cancellation_token().cancel();
        let report = runner.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.counts().cancelled, 3);
        assert_eq!(h.store.version_count(), 0);
    }

    /// Cancels the run from inside its own `run`, then still publishes.
    struct CancellingAction {
        token: CancellationToken,
    }

    impl Action for CancellingAction {
        fn name(&self) -> &str {
            "first"
        }

        fn job_type(&self) -> &str {
            "cancel"
        }

        fn outputs(&self) -> Vec<String> {
            vec!["first-out".to_string()]
        }

        async fn run(&self, tracker: &mut Tracker) -> anyhow::Result<()> {
            self.token.cancel();
            let out = tracker.work_dir().await?.join("first.txt");
            tokio::fs::write(&out, "done").await?;
            tracker
                .declare_output(
                    OutputSpec::new("first-out", ArtifactType::Dataset, location()).file(out),
                )
                .await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_while_running_lets_action_finish() {
        let h = harness();
        let token = CancellationToken::new();
        let mut graph = ActionGraph::new();
        let first = graph
            .add(
                CancellingAction {
                    token: token.clone(),
                },
                &[],
            )
            .unwrap();
        graph.add(WriteAction::new("sibling", vec!["S"]), &[]).unwrap();
        graph.add(WriteAction::new("child", vec!["C"]), &[first]).unwrap();

        let report = ActionRunner::new(graph, h.ctx.clone())
            .unwrap()
            .with_cancellation_token(token)
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(status(&report, "first"), ActionStatus::Succeeded);
        assert_eq!(
            status(&report, "sibling"),
            ActionStatus::skipped(SkipReason::Cancelled)
        );
        assert_eq!(
            status(&report, "child"),
            ActionStatus::skipped(SkipReason::Cancelled)
        );
        assert_eq!(h.store.version_count(), 1);
        let published = &report.action("first").unwrap().outputs[0];
        assert!(h.store.exists(published).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_run_does_not_report_cache_hits() {
        let h = harness();
        let first = ActionRunner::new(pipeline("1", false), h.ctx.clone())
            .unwrap()
            .run()
            .await
            .unwrap();
        assert!(first.is_success());

        let runner = ActionRunner::new(pipeline("1", false), h.ctx.clone()).unwrap();
        runner.cancellation_token().cancel();
        let report = runner.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.counts().cached, 0);
        assert_eq!(report.counts().cancelled, 3);
    }

    #[tokio::test]
    async fn test_timeout_fails_action() {
        let h = harness();
        let mut graph = ActionGraph::new();
        graph.add(SlowAction, &[]).unwrap();
        let report = ActionRunner::new(graph, h.ctx.clone())
            .unwrap()
            .with_options(RunOptions {
                action_timeout: Some(Duration::from_millis(20)),
                ..RunOptions::default()
            })
            .run()
            .await
            .unwrap();
        let slow = report.action("SlowAction").unwrap();
        assert_eq!(slow.status, ActionStatus::Failed);
        assert!(slow.error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let h = harness();
        let mut graph = ActionGraph::new();
        graph.add(PanicAction, &[]).unwrap();
        let report = ActionRunner::new(graph, h.ctx.clone()).unwrap().run().await.unwrap();
        let action = report.action("PanicAction").unwrap();
        assert_eq!(action.status, ActionStatus::Failed);
        assert!(action.error.as_ref().unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_unpublished_output_fails_action() {
        let h = harness();
        let mut graph = ActionGraph::new();
        graph.add(LazyAction, &[]).unwrap();
        let report = ActionRunner::new(graph, h.ctx.clone()).unwrap().run().await.unwrap();
        let lazy = report.action("LazyAction").unwrap();
        assert_eq!(lazy.status, ActionStatus::Failed);
        assert!(lazy.error.as_ref().unwrap().contains("never"));
    }

    #[tokio::test]
    async fn test_invalid_graph_rejected_before_running() {
        let h = harness();
        let mut graph = ActionGraph::new();
        graph.add(WriteAction::new("a", vec!["x"]), &[]).unwrap();
        graph.add(WriteAction::new("b", vec!["x"]), &[]).unwrap();
        let err = ActionRunner::new(graph, h.ctx.clone()).unwrap_err();
        assert!(matches!(err, RunnerError::Graph(GraphError::DuplicateOutput { .. })));
        assert_eq!(h.store.version_count(), 0);
    }

    #[tokio::test]
    async fn test_events_bracket_the_run() {
        let h = harness();
        let runner = ActionRunner::new(pipeline("1", false), h.ctx.clone()).unwrap();
        let mut rx = runner.events().subscribe();
        let report = runner.run().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(RunEvent::RunStarted { actions: 3, .. })));
        assert!(matches!(
            events.last(),
            Some(RunEvent::RunFinished {
                status: RunStatus::Succeeded,
                ..
            })
        ));
        let published = events
            .iter()
            .filter(|e| matches!(e, RunEvent::ArtifactPublished { .. }))
            .count();
        assert_eq!(published, 3);
        assert!(events.iter().all(|e| e.run_id() == report.run_id));
    }

    #[tokio::test]
    async fn test_parallel_wave_matches_sequential_result() {
        let h = harness();
        let mut graph = ActionGraph::new();
        let root = graph.add(WriteAction::new("root", vec!["r"]), &[]).unwrap();
        for (name, output) in [("w1", "o1"), ("w2", "o2"), ("w3", "o3")] {
            graph
                .add(WriteAction::new(name, vec![output]), &[root.clone()])
                .unwrap();
        }
        let report = ActionRunner::new(graph, h.ctx.clone())
            .unwrap()
            .with_options(RunOptions {
                max_parallel: 3,
                ..RunOptions::default()
            })
            .run()
            .await
            .unwrap();
        assert!(report.is_success());
        let names: Vec<&str> = report.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["root", "w1", "w2", "w3"]);
        assert_eq!(h.store.version_count(), 4);
    }
}

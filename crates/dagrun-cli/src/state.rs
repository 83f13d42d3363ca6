//! Application state wiring the infra adapters together.
//!
//! AppState holds the resolved data directory and configuration and builds
//! the concrete store, run log and run context used by every command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dagrun_core::artifact::BoxArtifactStore;
use dagrun_core::run::{RetryPolicy, RunContext, RunOptions};
use dagrun_infra::config::{DagrunPaths, load_config, resolve_data_dir};
use dagrun_infra::crypto::Sha256ContentHasher;
use dagrun_infra::metrics::JsonlMetricsSink;
use dagrun_infra::storage::{JsonRunLog, LocalObjectStore};
use dagrun_types::config::DagrunConfig;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: DagrunConfig,
    pub paths: DagrunPaths,
}

impl AppState {
    /// Resolve the data directory, make sure it exists, load `dagrun.toml`.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let paths = DagrunPaths::resolve(&data_dir, &config);
        tracing::debug!(data_dir = %data_dir.display(), store = %paths.store_dir.display(), "initialized state");
        Ok(Self { config, paths })
    }

    pub fn store(&self) -> LocalObjectStore {
        LocalObjectStore::new(&self.paths.store_dir)
    }

    pub fn run_log(&self) -> JsonRunLog {
        JsonRunLog::new(&self.paths.data_dir)
    }

    /// Context over the local store with SHA-256 versions.
    ///
    /// Metrics go to the JSON-lines file when `metrics_file` is configured,
    /// otherwise to the tracing sink. The file sink is returned as well so
    /// the caller can flush it once the run is over.
    pub async fn run_context(
        &self,
    ) -> anyhow::Result<(RunContext, Option<Arc<JsonlMetricsSink>>)> {
        let mut ctx = RunContext::new(
            BoxArtifactStore::new(self.store()),
            Sha256ContentHasher::new(),
            &self.paths.scratch_dir,
        )
        .with_retry(RetryPolicy::from(self.config.retry));

        let mut metrics_file = None;
        if let Some(path) = &self.paths.metrics_file {
            let sink = JsonlMetricsSink::open(path)
                .await
                .with_context(|| format!("opening metrics file {}", path.display()))?;
            let sink = Arc::new(sink);
            ctx = ctx.with_metrics(sink.clone());
            metrics_file = Some(sink);
        }
        Ok((ctx, metrics_file))
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions::from(&self.config)
    }
}

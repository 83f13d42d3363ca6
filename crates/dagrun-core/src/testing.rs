//! Shared fixtures for unit tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use dagrun_types::artifact::{ArtifactType, ObjectLocation};

use crate::action::Action;
use crate::artifact::memory::InMemoryArtifactStore;
use crate::artifact::tracker::{OutputSpec, Tracker};
use crate::artifact::BoxArtifactStore;
use crate::hash::ContentHasher;
use crate::metrics::InMemoryMetricsSink;
use crate::run::context::RunContext;
use crate::run::retry::RetryPolicy;

/// Deterministic, non-cryptographic hasher for tests.
pub struct TestHasher;

impl ContentHasher for TestHasher {
    fn compute_hash(&self, content: &[u8]) -> String {
        let mut hasher = DefaultHasher::new();
        hasher.write(content);
        format!("{:016x}", hasher.finish())
    }
}

/// Run context over a shared in-memory store, with no retry delay.
pub fn test_context(
    scratch: PathBuf,
    store: InMemoryArtifactStore,
    metrics: Arc<InMemoryMetricsSink>,
) -> RunContext {
    RunContext::new(BoxArtifactStore::new(store), TestHasher, scratch)
        .with_metrics(metrics)
        .with_retry(RetryPolicy::new(3, std::time::Duration::ZERO))
}

pub fn location() -> ObjectLocation {
    ObjectLocation::new("test-bucket", "artifacts/")
}

/// Action that writes one file per output with fixed content.
pub struct WriteAction {
    pub name: &'static str,
    pub outputs: Vec<&'static str>,
    pub content: &'static str,
    pub version: &'static str,
}

impl WriteAction {
    pub fn new(name: &'static str, outputs: Vec<&'static str>) -> Self {
        Self {
            name,
            outputs,
            content: "payload",
            version: "1",
        }
    }
}

impl Action for WriteAction {
    fn name(&self) -> &str {
        self.name
    }

    fn job_type(&self) -> &str {
        "write"
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.iter().map(|s| s.to_string()).collect()
    }

    fn code_version(&self) -> &str {
        self.version
    }

    async fn run(&self, tracker: &mut Tracker) -> anyhow::Result<()> {
        let mut inputs = String::new();
        for input in tracker.io().inputs.clone() {
            for path in tracker.declare_input(&input).await? {
                inputs.push_str(&tokio::fs::read_to_string(path).await?);
            }
        }
        let work = tracker.work_dir().await?;
        for output in &self.outputs {
            let path = work.join(format!("{output}.txt"));
            tokio::fs::write(&path, format!("{}|{}", self.content, inputs)).await?;
            tracker
                .declare_output(
                    OutputSpec::new(*output, ArtifactType::Dataset, location()).file(path),
                )
                .await?;
        }
        Ok(())
    }
}

/// Action that always fails.
pub struct FailAction {
    pub name: &'static str,
    pub outputs: Vec<&'static str>,
}

impl Action for FailAction {
    fn name(&self) -> &str {
        self.name
    }

    fn job_type(&self) -> &str {
        "fail"
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.iter().map(|s| s.to_string()).collect()
    }

    async fn run(&self, _tracker: &mut Tracker) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }
}

//! Shared collaborators for a run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::BoxArtifactStore;
use crate::event::EventBus;
use crate::hash::ContentHasher;
use crate::metrics::{MetricsSink, TracingMetricsSink};

use super::retry::RetryPolicy;

/// Store, hasher, sinks and scratch space shared by every tracker of a run.
///
/// Cheap to clone: every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct RunContext {
    store: Arc<BoxArtifactStore>,
    hasher: Arc<dyn ContentHasher>,
    metrics: Arc<dyn MetricsSink>,
    events: EventBus,
    retry: RetryPolicy,
    scratch_dir: PathBuf,
}

impl RunContext {
    /// Context with a tracing metrics sink, a fresh event bus and the
    /// default retry policy.
    pub fn new(
        store: BoxArtifactStore,
        hasher: impl ContentHasher + 'static,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            hasher: Arc::new(hasher),
            metrics: Arc::new(TracingMetricsSink),
            events: EventBus::default(),
            retry: RetryPolicy::default(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &BoxArtifactStore {
        &self.store
    }

    pub fn hasher(&self) -> &dyn ContentHasher {
        self.hasher.as_ref()
    }

    pub fn metrics(&self) -> &dyn MetricsSink {
        self.metrics.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("scratch_dir", &self.scratch_dir)
            .field("retry", &self.retry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

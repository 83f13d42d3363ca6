//! MetricsSink trait and in-process adapters.
//!
//! The JSON-lines file adapter lives in dagrun-infra.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Destination for metrics logged by actions.
///
/// Keyed by `(run_id, action)`. Used for observability only; a failing sink
/// never fails the action.
pub trait MetricsSink: Send + Sync {
    fn record(
        &self,
        run_id: Uuid,
        action: &str,
        metrics: &BTreeMap<String, f64>,
    ) -> std::io::Result<()>;
}

/// One logged batch, as stored by sinks that keep history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub run_id: Uuid,
    pub action: String,
    pub metrics: BTreeMap<String, f64>,
    pub logged_at: DateTime<Utc>,
}

impl MetricsRecord {
    pub fn new(run_id: Uuid, action: &str, metrics: &BTreeMap<String, f64>) -> Self {
        Self {
            run_id,
            action: action.to_string(),
            metrics: metrics.clone(),
            logged_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryMetricsSink
// ---------------------------------------------------------------------------

/// Keeps every batch in memory, in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    records: Mutex<Vec<MetricsRecord>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricsRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Batches logged by one action, in arrival order.
    pub fn for_action(&self, action: &str) -> Vec<MetricsRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record(
        &self,
        run_id: Uuid,
        action: &str,
        metrics: &BTreeMap<String, f64>,
    ) -> std::io::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| std::io::Error::other("metrics sink lock poisoned"))?;
        records.push(MetricsRecord::new(run_id, action, metrics));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TracingMetricsSink
// ---------------------------------------------------------------------------

/// Emits every metric as an `info` event on the `dagrun::metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(
        &self,
        run_id: Uuid,
        action: &str,
        metrics: &BTreeMap<String, f64>,
    ) -> std::io::Result<()> {
        for (name, value) in metrics {
            tracing::info!(
                target: "dagrun::metrics",
                run_id = %run_id,
                action,
                metric = name.as_str(),
                value,
                "metric logged"
            );
        }
        Ok(())
    }
}

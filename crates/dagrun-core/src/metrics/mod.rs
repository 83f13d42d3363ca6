//! Metrics sinks: where `Tracker::log` forwards metric batches.

pub mod sink;

pub use sink::{InMemoryMetricsSink, MetricsRecord, MetricsSink, TracingMetricsSink};

//! Demo housing-price pipeline: ingest -> train -> evaluate.
//!
//! Options (`--set key=value`):
//! - `rows` -- number of generated rows (default 500)
//! - `seed` -- generator seed (default 42)

pub mod actions;
pub mod dataset;
pub mod regression;

use dagrun_core::graph::{ActionBuilder, ActionGraph, GraphError};
use dagrun_types::config::PipelineConfig;

use actions::{EvaluateModel, IngestHousingDataset, TrainLinearRegression};

pub const PROJECT_NAME: &str = "dagrun_demo_housing";
pub const DEFAULT_ROWS: u64 = 500;
pub const DEFAULT_SEED: u64 = 42;

/// Smallest dataset that still leaves training rows for every coefficient.
const MIN_ROWS: u64 = 20;

/// `ActionBuilder` for the housing pipeline.
#[derive(Debug, Default)]
pub struct HousingPipeline;

impl ActionBuilder for HousingPipeline {
    fn project_name(&self) -> &str {
        PROJECT_NAME
    }

    fn build_actions(&self, config: &PipelineConfig) -> Result<ActionGraph, GraphError> {
        let rows = option_u64(config, "rows", DEFAULT_ROWS)?;
        if rows < MIN_ROWS {
            return Err(GraphError::InvalidConfig(format!(
                "rows must be at least {MIN_ROWS}, got {rows}"
            )));
        }
        let seed = option_u64(config, "seed", DEFAULT_SEED)?;

        let mut graph = ActionGraph::new();
        let ingest = graph.add(IngestHousingDataset::new(rows as usize, seed), &[])?;
        let train = graph.add(TrainLinearRegression, &[ingest.clone()])?;
        graph.add(EvaluateModel, &[ingest, train])?;
        Ok(graph)
    }
}

fn option_u64(config: &PipelineConfig, key: &str, default: u64) -> Result<u64, GraphError> {
    match config.get(key) {
        None => Ok(default),
        Some(value) => value.as_u64().ok_or_else(|| {
            GraphError::InvalidConfig(format!("'{key}' must be a non-negative integer, got {value}"))
        }),
    }
}

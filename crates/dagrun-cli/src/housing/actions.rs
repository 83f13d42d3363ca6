//! Actions of the housing-price pipeline.
//!
//! 1. Ingest: generate the dataset and publish it as an artifact.
//! 2. Train: fit a linear regression on the train split, publish the model.
//! 3. Evaluate: score the model on the test split, log metrics and publish
//!    the predictions.

use std::path::PathBuf;

use anyhow::Context;
use dagrun_core::action::Action;
use dagrun_core::artifact::{OutputSpec, Tracker};
use dagrun_types::artifact::{ArtifactType, ObjectLocation};

use super::dataset::{Dataset, INPUT_FEATURES};
use super::regression::{LinearModel, score};

pub const BUCKET: &str = "dagrun-demo-housing";
pub const DATASET_ARTIFACT: &str = "housing-dataset";
pub const MODEL_ARTIFACT: &str = "linear-model";
pub const PREDICTIONS_ARTIFACT: &str = "model-predictions";

const JOB_GROUP: &str = "model";

/// The single file of a materialized input.
async fn single_input(tracker: &mut Tracker, name: &str) -> anyhow::Result<PathBuf> {
    let mut paths = tracker.declare_input(name).await?;
    match (paths.pop(), paths.is_empty()) {
        (Some(path), true) => Ok(path),
        _ => anyhow::bail!("expected exactly one file in artifact '{name}'"),
    }
}

async fn load_dataset(tracker: &mut Tracker) -> anyhow::Result<Dataset> {
    let path = single_input(tracker, DATASET_ARTIFACT).await?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Dataset::from_csv(&text)?)
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

pub struct IngestHousingDataset {
    rows: usize,
    seed: u64,
    code_version: String,
}

impl IngestHousingDataset {
    pub fn new(rows: usize, seed: u64) -> Self {
        Self {
            rows,
            seed,
            // Generation parameters determine the output, so they are part of
            // the action's identity.
            code_version: format!("1;rows={rows};seed={seed}"),
        }
    }
}

impl Action for IngestHousingDataset {
    fn job_type(&self) -> &str {
        "ingest-dataset"
    }

    fn job_group(&self) -> &str {
        JOB_GROUP
    }

    fn outputs(&self) -> Vec<String> {
        vec![DATASET_ARTIFACT.to_string()]
    }

    fn code_version(&self) -> &str {
        &self.code_version
    }

    async fn run(&self, tracker: &mut Tracker) -> anyhow::Result<()> {
        let dataset = Dataset::synthetic(self.rows, self.seed);
        tracing::info!(rows = dataset.len(), seed = self.seed, "generated housing dataset");

        let dir = tracker.work_dir().await?.join("ingest");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("housing.csv");
        tokio::fs::write(&path, dataset.to_csv()).await?;

        tracker
            .declare_output(
                OutputSpec::new(
                    DATASET_ARTIFACT,
                    ArtifactType::Dataset,
                    ObjectLocation::new(BUCKET, "datasets/"),
                )
                .file(&path)
                .strip_prefix(&dir),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Train
// ---------------------------------------------------------------------------

pub struct TrainLinearRegression;

impl Action for TrainLinearRegression {
    fn job_type(&self) -> &str {
        "train-model"
    }

    fn job_group(&self) -> &str {
        JOB_GROUP
    }

    fn outputs(&self) -> Vec<String> {
        vec![MODEL_ARTIFACT.to_string()]
    }

    async fn run(&self, tracker: &mut Tracker) -> anyhow::Result<()> {
        let dataset = load_dataset(tracker).await?;
        let (features, target) = dataset.split(true)?;

        tracing::info!(rows = features.len(), "training model");
        let names = INPUT_FEATURES.iter().map(|f| f.to_string()).collect();
        let model = LinearModel::fit(names, &features, &target)?;
        tracing::debug!(intercept = model.intercept, coefficients = ?model.coefficients, "fitted model");

        let dir = tracker.work_dir().await?.join("model");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("linear-model.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&model)?).await?;

        tracker
            .declare_output(
                OutputSpec::new(
                    MODEL_ARTIFACT,
                    ArtifactType::Model,
                    ObjectLocation::new(BUCKET, "models/"),
                )
                .file(&path)
                .strip_prefix(&dir),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

pub struct EvaluateModel;

impl Action for EvaluateModel {
    fn job_type(&self) -> &str {
        "eval-model"
    }

    fn job_group(&self) -> &str {
        JOB_GROUP
    }

    fn outputs(&self) -> Vec<String> {
        vec![PREDICTIONS_ARTIFACT.to_string()]
    }

    async fn run(&self, tracker: &mut Tracker) -> anyhow::Result<()> {
        let dataset = load_dataset(tracker).await?;
        let model_path = single_input(tracker, MODEL_ARTIFACT).await?;
        let model: LinearModel = serde_json::from_slice(&tokio::fs::read(&model_path).await?)
            .with_context(|| format!("parsing model {}", model_path.display()))?;

        let (features, target) = dataset.split(false)?;
        let predictions = model.predict(&features);

        let mut csv = String::from("actual,prediction\n");
        for (actual, predicted) in target.iter().zip(&predictions) {
            csv.push_str(&format!("{actual},{predicted}\n"));
        }
        let dir = tracker.work_dir().await?.join("predictions");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("model_predictions.csv");
        tokio::fs::write(&path, csv).await?;

        let scores = score(&target, &predictions);
        tracing::info!(mse = scores.mse, mae = scores.mae, r2 = scores.r2, "evaluated model");
        tracker.log([("mse", scores.mse), ("mae", scores.mae), ("r2", scores.r2)]);

        tracker
            .declare_output(
                OutputSpec::new(
                    PREDICTIONS_ARTIFACT,
                    ArtifactType::Predictions,
                    ObjectLocation::new(BUCKET, "predictions/"),
                )
                .file(&path)
                .strip_prefix(&dir),
            )
            .await?;
        Ok(())
    }
}

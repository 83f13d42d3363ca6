//! Housing dataset: deterministic synthetic generation, CSV encoding and the
//! fixed train/test split.
//!
//! Every action that touches the dataset goes through [`Dataset::split`], so
//! training and evaluation can never disagree about which rows are held out.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

pub const TARGET_FEATURE: &str = "MedHouseVal";

pub const INPUT_FEATURES: [&str; 8] = [
    "MedInc",
    "HouseAge",
    "AveRooms",
    "AveBedrms",
    "Population",
    "AveOccup",
    "Latitude",
    "Longitude",
];

/// Seed of the train/test shuffle.
pub const SPLIT_SEED: u64 = 7;

/// Share of rows held out for evaluation.
pub const TEST_FRACTION: f64 = 0.25;

#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    #[error("dataset is empty")]
    Empty,

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Seeded generator for dataset rows and the split shuffle.
///
/// ChaCha8 output is fixed for a given seed across platforms and releases,
/// which keeps generated artifacts (and their versions) stable.
fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Column-named table of numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Dataset {
    /// California-housing-shaped synthetic data with a noisy linear target.
    pub fn synthetic(rows: usize, seed: u64) -> Self {
        let mut rng = seeded_rng(seed);
        let mut columns: Vec<String> = INPUT_FEATURES.iter().map(|c| c.to_string()).collect();
        columns.push(TARGET_FEATURE.to_string());

        let data = (0..rows)
            .map(|_| {
                let med_inc: f64 = rng.gen_range(0.5..10.0);
                let house_age: f64 = rng.gen_range(1.0_f64..52.0).floor();
                let ave_rooms: f64 = rng.gen_range(3.0..8.0);
                let ave_bedrms: f64 = rng.gen_range(0.8..1.4);
                let population: f64 = rng.gen_range(100.0_f64..3100.0).floor();
                let ave_occup: f64 = rng.gen_range(1.5..4.5);
                let latitude: f64 = rng.gen_range(32.5..42.0);
                let longitude: f64 = rng.gen_range(-124.3..-114.3);
                let noise: f64 = rng.sample(StandardNormal);
                let value: f64 = 0.6 + 0.42 * med_inc + 0.009 * house_age - 0.08 * ave_rooms
                    + 0.5 * ave_bedrms
                    - 0.000_02 * population
                    - 0.04 * ave_occup
                    - 0.03 * (latitude - 32.5)
                    + 0.3 * noise;
                [
                    med_inc, house_age, ave_rooms, ave_bedrms, population, ave_occup, latitude,
                    longitude,
                    value.clamp(0.15, 5.0),
                ]
                .into_iter()
                .map(round4)
                .collect()
            })
            .collect();

        Self {
            columns,
            rows: data,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DatasetError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
    }

    pub fn to_csv(&self) -> String {
        let mut out = self.columns.join(",");
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    pub fn from_csv(text: &str) -> Result<Self, DatasetError> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines.next().ok_or(DatasetError::Empty)?;
        let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let row = line
                .split(',')
                .map(|cell| cell.trim().parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()
                .map_err(|err| DatasetError::Parse {
                    line: idx + 1,
                    reason: err.to_string(),
                })?;
            if row.len() != columns.len() {
                return Err(DatasetError::Parse {
                    line: idx + 1,
                    reason: format!("expected {} cells, got {}", columns.len(), row.len()),
                });
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    /// Input features and target of the train (or test) split.
    pub fn split(&self, train: bool) -> Result<(Vec<Vec<f64>>, Vec<f64>), DatasetError> {
        if self.is_empty() {
            return Err(DatasetError::Empty);
        }
        let feature_idx = INPUT_FEATURES
            .iter()
            .map(|f| self.column_index(f))
            .collect::<Result<Vec<usize>, _>>()?;
        let target_idx = self.column_index(TARGET_FEATURE)?;

        let (train_rows, test_rows) = split_indices(self.len(), SPLIT_SEED, TEST_FRACTION);
        let selected = if train { train_rows } else { test_rows };
        let features = selected
            .iter()
            .map(|&i| feature_idx.iter().map(|&c| self.rows[i][c]).collect())
            .collect();
        let target = selected.iter().map(|&i| self.rows[i][target_idx]).collect();
        Ok((features, target))
    }
}

/// Shuffle `0..n` and hold out `ceil(n * test_fraction)` rows.
///
/// Returns `(train, test)` row indices.
pub fn split_indices(n: usize, seed: u64, test_fraction: f64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut seeded_rng(seed));
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let train = order.split_off(n_test.min(n));
    (train, order)
}

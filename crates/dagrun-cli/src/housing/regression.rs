//! Ordinary least squares with an intercept, plus evaluation scores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegressionError {
    #[error("no training rows")]
    Empty,

    #[error("row {row} has {got} features, expected {expected}")]
    Dimension {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("features are linearly dependent; normal equations are singular")]
    Singular,
}

/// Fitted linear model, serialized as the `linear-model` artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub train_rows: usize,
}

impl LinearModel {
    /// Fit by solving the normal equations `(XᵀX) β = Xᵀy`.
    pub fn fit(features: Vec<String>, x: &[Vec<f64>], y: &[f64]) -> Result<Self, RegressionError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(RegressionError::Empty);
        }
        let p = features.len();
        for (row, values) in x.iter().enumerate() {
            if values.len() != p {
                return Err(RegressionError::Dimension {
                    row,
                    got: values.len(),
                    expected: p,
                });
            }
        }

        // Column 0 is the intercept.
        let dim = p + 1;
        let mut xtx = vec![vec![0.0; dim]; dim];
        let mut xty = vec![0.0; dim];
        for (values, target) in x.iter().zip(y) {
            let augmented: Vec<f64> = std::iter::once(1.0).chain(values.iter().copied()).collect();
            for i in 0..dim {
                xty[i] += augmented[i] * target;
                for j in 0..dim {
                    xtx[i][j] += augmented[i] * augmented[j];
                }
            }
        }

        let beta = solve(xtx, xty)?;
        Ok(Self {
            features,
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
            train_rows: x.len(),
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, RegressionError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .ok_or(RegressionError::Singular)?;
        if a[pivot][col].abs() < 1e-12 {
            return Err(RegressionError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Regression scores logged by the evaluation action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub mse: f64,
    pub mae: f64,
    pub r2: f64,
}

pub fn score(actual: &[f64], predicted: &[f64]) -> Scores {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return Scores {
            mse: 0.0,
            mae: 0.0,
            r2: 0.0,
        };
    }
    let pairs = || actual.iter().zip(predicted).take(n);
    let mse = pairs().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n as f64;
    let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n as f64;

    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res = mse * n as f64;
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };
    Scores { mse, mae, r2 }
}

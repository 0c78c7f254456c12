//! Ridge linear regression solved in closed form

use super::Regressor;
use crate::artifact::{write_atomic, PublishedArtifact};
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const MODEL_NAME: &str = "linear_regression";

/// Default L2 penalty; keeps the normal equations solvable when one-hot
/// columns are collinear with the bias.
const DEFAULT_L2: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    l2: f64,
    weights: Vec<f64>,
    bias: f64,
    fitted: bool,
}

impl Default for LinearRegressor {
    fn default() -> Self {
        Self::with_l2(DEFAULT_L2)
    }
}

impl LinearRegressor {
    pub fn with_l2(l2: f64) -> Self {
        Self {
            l2,
            weights: Vec::new(),
            bias: 0.0,
            fitted: false,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn load(path: &Path) -> LifecycleResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| LifecycleError::io(path, e))?;
        let model: Self = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), width = model.weights.len(), "Model loaded");
        Ok(model)
    }
}

impl Regressor for LinearRegressor {
    fn name(&self) -> &'static str {
        MODEL_NAME
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn train(&mut self, features: &[FeatureVector], targets: &[f64]) -> LifecycleResult<()> {
        if features.is_empty() {
            return Err(LifecycleError::validation("cannot train on zero rows"));
        }
        if features.len() != targets.len() {
            return Err(LifecycleError::validation(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let width = features[0].width();
        if features.iter().any(|f| f.width() != width) {
            return Err(LifecycleError::validation("feature rows have differing widths"));
        }

        // Augmented design [x, 1]; the bias column is not penalised.
        let dim = width + 1;
        let mut gram = vec![vec![0.0; dim]; dim];
        let mut rhs = vec![0.0; dim];
        for (row, &y) in features.iter().zip(targets) {
            let x: Vec<f64> = row.values.iter().copied().chain(std::iter::once(1.0)).collect();
            for i in 0..dim {
                rhs[i] += x[i] * y;
                for j in 0..dim {
                    gram[i][j] += x[i] * x[j];
                }
            }
        }
        for (i, row) in gram.iter_mut().enumerate().take(width) {
            row[i] += self.l2;
        }

        let solution = solve(gram, rhs)?;
        self.weights = solution[..width].to_vec();
        self.bias = solution[width];
        self.fitted = true;

        debug!(rows = features.len(), width, bias = self.bias, "Linear model trained");
        Ok(())
    }

    fn predict(&self, features: &[FeatureVector]) -> LifecycleResult<Vec<f64>> {
        if !self.fitted {
            return Err(LifecycleError::validation("model has not been trained"));
        }
        features
            .iter()
            .map(|row| {
                if row.width() != self.weights.len() {
                    return Err(LifecycleError::validation(format!(
                        "feature width {} does not match model width {}",
                        row.width(),
                        self.weights.len()
                    )));
                }
                Ok(row
                    .values
                    .iter()
                    .zip(&self.weights)
                    .map(|(x, w)| x * w)
                    .sum::<f64>()
                    + self.bias)
            })
            .collect()
    }

    fn save(&self, path: &Path) -> LifecycleResult<PublishedArtifact> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> LifecycleResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(LifecycleError::validation("normal equations are singular"));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
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
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

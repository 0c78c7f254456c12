//! Fitted encoding state
//!
//! Learns imputation values, one-hot categories and min-max ranges from the
//! training partition, then applies exactly that state to any later input.

use super::features::Vocabulary;
use crate::artifact::{write_atomic, PublishedArtifact};
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{FeatureRow, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Value substituted for a missing categorical before encoding
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Version of the serialized preprocessor layout
const FORMAT_VERSION: u32 = 1;

/// How missing numeric values are filled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy", content = "value")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Constant(f64),
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ColumnKind {
    Categorical,
    Numeric {
        impute: ImputeStrategy,
        /// Emit a 0/1 column marking rows whose value was imputed
        add_indicator: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Categorical,
        }
    }

    pub fn numeric(name: &str, impute: ImputeStrategy, add_indicator: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Numeric {
                impute,
                add_indicator,
            },
        }
    }
}

/// Column layout of the preprocessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    pub columns: Vec<ColumnSpec>,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnSpec::categorical("pet_breed_id"),
                ColumnSpec::categorical("gender"),
                ColumnSpec::categorical("neuter_yn"),
                ColumnSpec::numeric("age", ImputeStrategy::Mean, false),
                ColumnSpec::numeric("weight_kg", ImputeStrategy::Mean, true),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedCategorical {
    column: String,
    categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedNumeric {
    column: String,
    fill_value: f64,
    min: f64,
    max: f64,
    add_indicator: bool,
}

impl FittedNumeric {
    fn scale(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range.abs() < f64::EPSILON {
            0.0
        } else {
            (value - self.min) / range
        }
    }

    fn unscale(&self, scaled: f64) -> f64 {
        scaled * (self.max - self.min) + self.min
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedState {
    vocabulary: Vocabulary,
    categorical: Vec<FittedCategorical>,
    numeric: Vec<FittedNumeric>,
}

#[derive(Serialize, Deserialize)]
struct PreprocessorArtifact {
    format_version: u32,
    config: PreprocessorConfig,
    state: Option<FittedState>,
}

/// Converts feature rows to fixed-width vectors, stable across category drift
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAwarePreprocessor {
    config: PreprocessorConfig,
    state: Option<FittedState>,
}

impl Default for CategoryAwarePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessorConfig::default())
    }
}

impl CategoryAwarePreprocessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Breed vocabulary frozen at fit time
    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.state.as_ref().map(|s| &s.vocabulary)
    }

    /// Learn encoding state from the training partition only
    pub fn fit(&mut self, rows: &[FeatureRow]) -> LifecycleResult<&mut Self> {
        if rows.is_empty() {
            return Err(LifecycleError::validation("cannot fit preprocessor on zero rows"));
        }

        let mut categorical = Vec::new();
        let mut numeric = Vec::new();

        for spec in &self.config.columns {
            match &spec.kind {
                ColumnKind::Categorical => {
                    let mut seen = BTreeSet::new();
                    for row in rows {
                        let value = categorical_value(row, &spec.name)?;
                        seen.insert(value);
                    }
                    // The fallback breed keeps a column even when training saw none.
                    if spec.name == "pet_breed_id" {
                        seen.insert(crate::models::FALLBACK_BREED.to_string());
                    }
                    categorical.push(FittedCategorical {
                        column: spec.name.clone(),
                        categories: seen.into_iter().collect(),
                    });
                }
                ColumnKind::Numeric {
                    impute,
                    add_indicator,
                } => {
                    let observed: Vec<f64> = rows
                        .iter()
                        .map(|row| numeric_value(row, &spec.name))
                        .collect::<LifecycleResult<Vec<_>>>()?
                        .into_iter()
                        .flatten()
                        .collect();
                    let fill_value = impute_value(*impute, &observed);
                    let filled: Vec<f64> = rows
                        .iter()
                        .map(|row| numeric_value(row, &spec.name).map(|v| v.unwrap_or(fill_value)))
                        .collect::<LifecycleResult<Vec<_>>>()?;
                    let min = filled.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = filled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    numeric.push(FittedNumeric {
                        column: spec.name.clone(),
                        fill_value,
                        min,
                        max,
                        add_indicator: *add_indicator,
                    });
                }
            }
        }

        let vocabulary = Vocabulary::new(rows.iter().map(|r| r.pet_breed_id));
        self.state = Some(FittedState {
            vocabulary,
            categorical,
            numeric,
        });

        info!(
            rows = rows.len(),
            width = self.width().unwrap_or(0),
            "Preprocessor fitted"
        );
        Ok(self)
    }

    /// Apply the already fitted state
    pub fn transform(&self, rows: &[FeatureRow]) -> LifecycleResult<Vec<FeatureVector>> {
        let state = self.state.as_ref().ok_or(LifecycleError::NotFitted)?;
        let width = state_width(state);

        let vectors = rows
            .iter()
            .map(|row| {
                let mut values = Vec::with_capacity(width);
                for cat in &state.categorical {
                    let value = categorical_value(row, &cat.column)?;
                    // Unseen categories encode as all zeros.
                    values.extend(
                        cat.categories
                            .iter()
                            .map(|c| if *c == value { 1.0 } else { 0.0 }),
                    );
                }
                for num in &state.numeric {
                    let raw = numeric_value(row, &num.column)?;
                    values.push(num.scale(raw.unwrap_or(num.fill_value)));
                    if num.add_indicator {
                        values.push(if raw.is_none() { 1.0 } else { 0.0 });
                    }
                }
                Ok(FeatureVector { values })
            })
            .collect::<LifecycleResult<Vec<_>>>()?;

        debug!(rows = vectors.len(), width, "Rows transformed");
        Ok(vectors)
    }

    /// Fit then transform the same rows. Training only: calling this on
    /// inference input would silently replace the fitted state.
    pub fn fit_transform(&mut self, rows: &[FeatureRow]) -> LifecycleResult<Vec<FeatureVector>> {
        self.fit(rows)?;
        self.transform(rows)
    }

    /// Output width once fitted
    pub fn width(&self) -> Option<usize> {
        self.state.as_ref().map(state_width)
    }

    /// Names of the output columns in order
    pub fn feature_names(&self) -> LifecycleResult<Vec<String>> {
        let state = self.state.as_ref().ok_or(LifecycleError::NotFitted)?;
        let mut names = Vec::with_capacity(state_width(state));
        for cat in &state.categorical {
            names.extend(
                cat.categories
                    .iter()
                    .map(|c| format!("categorical__{}_{}", cat.column, c)),
            );
        }
        for num in &state.numeric {
            names.push(format!("numeric__{}", num.column));
            if num.add_indicator {
                names.push(format!("missing__{}", num.column));
            }
        }
        Ok(names)
    }

    /// Undo min-max scaling of a numeric column for reporting
    pub fn inverse_numeric(&self, column: &str, scaled: f64) -> LifecycleResult<f64> {
        let state = self.state.as_ref().ok_or(LifecycleError::NotFitted)?;
        state
            .numeric
            .iter()
            .find(|n| n.column == column)
            .map(|n| n.unscale(scaled))
            .ok_or_else(|| LifecycleError::MissingColumn(column.to_string()))
    }

    /// Serialize config and fitted state as one opaque artifact
    pub fn dump(&self, path: &Path) -> LifecycleResult<PublishedArtifact> {
        let artifact = PreprocessorArtifact {
            format_version: FORMAT_VERSION,
            config: self.config.clone(),
            state: self.state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&artifact)?;
        let published = write_atomic(path, &bytes)?;
        info!(path = %path.display(), checksum = %published.checksum, "Preprocessor dumped");
        Ok(published)
    }

    /// Restore a preprocessor written by [`dump`](Self::dump)
    pub fn load(path: &Path) -> LifecycleResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| LifecycleError::io(path, e))?;
        let artifact: PreprocessorArtifact = serde_json::from_slice(&bytes)?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(LifecycleError::Serialization(format!(
                "unsupported preprocessor format version {}",
                artifact.format_version
            )));
        }
        info!(path = %path.display(), fitted = artifact.state.is_some(), "Preprocessor loaded");
        Ok(Self {
            config: artifact.config,
            state: artifact.state,
        })
    }
}

fn state_width(state: &FittedState) -> usize {
    let categorical: usize = state.categorical.iter().map(|c| c.categories.len()).sum();
    let numeric: usize = state
        .numeric
        .iter()
        .map(|n| if n.add_indicator { 2 } else { 1 })
        .sum();
    categorical + numeric
}

fn categorical_value(row: &FeatureRow, column: &str) -> LifecycleResult<String> {
    row.categorical(column)
        .map(|v| v.unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()))
        .ok_or_else(|| LifecycleError::MissingColumn(column.to_string()))
}

fn numeric_value(row: &FeatureRow, column: &str) -> LifecycleResult<Option<f64>> {
    row.numeric(column)
        .map(|v| v.filter(|x| x.is_finite()))
        .ok_or_else(|| LifecycleError::MissingColumn(column.to_string()))
}

fn impute_value(strategy: ImputeStrategy, observed: &[f64]) -> f64 {
    match strategy {
        ImputeStrategy::Zero => 0.0,
        ImputeStrategy::Constant(v) => v,
        _ if observed.is_empty() => 0.0,
        ImputeStrategy::Mean => observed.iter().sum::<f64>() / observed.len() as f64,
        ImputeStrategy::Median => {
            let mut sorted = observed.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
    }
}

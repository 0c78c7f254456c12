//! Online inference against one immutable serving context

use crate::artifact::{resolve_serving_pair, write_atomic, ArtifactManifest, ArtifactPair};
use crate::error::{LifecycleError, LifecycleResult};
use crate::model::{load_model, Regressor};
use crate::models::{age_in_years, PredictionResult, RawRecord};
use crate::observability::{LifecycleMetrics, StructuredLogger};
use crate::preprocess::{preprocess, CategoryAwarePreprocessor, Vocabulary};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Currency unit predictions are rounded to
pub const PRICE_ROUNDING: f64 = 1000.0;

pub fn round_price(value: f64) -> f64 {
    (value / PRICE_ROUNDING).round() * PRICE_ROUNDING
}

/// Fitted preprocessor and model from one training run.
///
/// Built once at start-up and shared read-only; nothing in here is ever
/// refit while serving.
pub struct ServingContext {
    tag: String,
    model_name: String,
    preprocessor: CategoryAwarePreprocessor,
    model: Box<dyn Regressor>,
    checksum_verified: bool,
    audit: Option<AuditLog>,
}

impl std::fmt::Debug for ServingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingContext")
            .field("tag", &self.tag)
            .field("model_name", &self.model_name)
            .field("checksum_verified", &self.checksum_verified)
            .finish()
    }
}

impl ServingContext {
    /// Resolve the newest matching pair under `artifact_dir` and load it
    pub fn load(artifact_dir: &Path, model_name: &str) -> LifecycleResult<Self> {
        let pair = resolve_serving_pair(artifact_dir, model_name)?;
        Self::from_pair(&pair, model_name)
    }

    pub fn from_pair(pair: &ArtifactPair, model_name: &str) -> LifecycleResult<Self> {
        let checksum_verified = match &pair.manifest {
            Some(path) => {
                ArtifactManifest::read(path)?.verify(&pair.preprocessor, &pair.model)?;
                true
            }
            None => false,
        };

        let preprocessor = CategoryAwarePreprocessor::load(&pair.preprocessor)?;
        if !preprocessor.is_fitted() {
            return Err(LifecycleError::NotFitted);
        }
        let model = load_model(model_name, &pair.model)?;

        StructuredLogger::new("serving").log_artifacts_loaded(
            &pair.tag,
            &pair.preprocessor.display().to_string(),
            &pair.model.display().to_string(),
            checksum_verified,
        );
        LifecycleMetrics::new().set_serving_artifact(&pair.tag, model_name);

        Ok(Self {
            tag: pair.tag.clone(),
            model_name: model_name.to_string(),
            preprocessor,
            model,
            checksum_verified,
            audit: None,
        })
    }

    /// Append every prediction to a CSV audit file
    pub fn with_audit(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit = Some(AuditLog::new(path));
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn checksum_verified(&self) -> bool {
        self.checksum_verified
    }

    pub fn preprocessor(&self) -> &CategoryAwarePreprocessor {
        &self.preprocessor
    }

    /// Predict claim cost for `new` records.
    ///
    /// The breed vocabulary comes from `previous` only; with no previous
    /// rows the vocabulary frozen into the preprocessor is used.
    pub fn predict(&self, previous: &[RawRecord], new: &[RawRecord]) -> LifecycleResult<Vec<PredictionResult>> {
        if new.is_empty() {
            return Err(LifecycleError::validation("no records to predict"));
        }

        let vocabulary = if previous.is_empty() {
            self.preprocessor.vocabulary().cloned().unwrap_or_default()
        } else {
            Vocabulary::from_records(previous)
        };

        let rows = preprocess(new, &vocabulary)?;
        let features = self.preprocessor.transform(&rows)?;
        let raw_predictions = self.model.predict(&features)?;

        let results: Vec<PredictionResult> = new
            .iter()
            .zip(&rows)
            .zip(raw_predictions)
            .map(|((record, row), price)| PredictionResult {
                pet_breed_id: record.pet_breed_id,
                age: age_in_years(row.age_days),
                gender: record.gender.clone(),
                neuter_yn: record.neuter_yn.clone(),
                weight_kg: record.weight_kg,
                predicted_claim_price: round_price(price),
                model_tag: self.tag.clone(),
            })
            .collect();

        debug!(rows = results.len(), tag = %self.tag, "Predictions generated");

        if let Some(audit) = &self.audit {
            audit.append(&results)?;
        }
        Ok(results)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AuditRow {
    predicted_at: String,
    model_tag: String,
    pet_breed_id: i64,
    age: i64,
    gender: Option<String>,
    neuter_yn: Option<String>,
    weight_kg: Option<f64>,
    predicted_claim_price: f64,
}

/// CSV log of served predictions, rewritten atomically on each append
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, results: &[PredictionResult]) -> LifecycleResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LifecycleError::validation("audit log lock poisoned"))?;

        let mut rows: Vec<AuditRow> = if self.path.exists() {
            let mut reader = csv::Reader::from_path(&self.path)?;
            reader.deserialize().collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };

        let predicted_at = Utc::now().to_rfc3339();
        rows.extend(results.iter().map(|r| AuditRow {
            predicted_at: predicted_at.clone(),
            model_tag: r.model_tag.clone(),
            pet_breed_id: r.pet_breed_id,
            age: r.age,
            gender: r.gender.clone(),
            neuter_yn: r.neuter_yn.clone(),
            weight_kg: r.weight_kg,
            predicted_claim_price: r.predicted_claim_price,
        }));

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| LifecycleError::Serialization(e.to_string()))?;
        write_atomic(&self.path, &bytes)?;

        info!(path = %self.path.display(), appended = results.len(), total = rows.len(), "Predictions audited");
        Ok(())
    }

    pub fn len(&self) -> LifecycleResult<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        Ok(reader.records().count())
    }

    pub fn is_empty(&self) -> LifecycleResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(123_456.0), 123_000.0);
        assert_eq!(round_price(123_500.0), 124_000.0);
        assert_eq!(round_price(499.0), 0.0);
    }

    #[test]
    fn test_audit_log_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit/predictions.csv"));
        assert!(log.is_empty().unwrap());

        let result = PredictionResult {
            pet_breed_id: 1144,
            age: 2,
            gender: Some("F".into()),
            neuter_yn: None,
            weight_kg: Some(4.5),
            predicted_claim_price: 120_000.0,
            model_tag: "20240101_000000".into(),
        };
        log.append(&[result.clone()]).unwrap();
        log.append(&[result.clone(), result]).unwrap();
        assert_eq!(log.len().unwrap(), 3);
    }
}

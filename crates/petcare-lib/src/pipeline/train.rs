//! Offline training: split, fit on train only, evaluate, publish

use super::evaluate::{Evaluation, DEFAULT_OUTLIER_THRESHOLD};
use super::split::{train_test_split, MIN_TRAINING_ROWS};
use crate::artifact::{artifact_file_name, timestamp_tag, ArtifactManifest};
use crate::error::{LifecycleError, LifecycleResult};
use crate::model::{create_model, LINEAR_REGRESSION};
use crate::models::RawRecord;
use crate::observability::{LifecycleMetrics, StructuredLogger};
use crate::preprocess::{preprocess, CategoryAwarePreprocessor, PreprocessorConfig, Vocabulary};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub test_split_ratio: f64,
    pub seed: u64,
    /// Registry name; also the artifact file prefix
    pub model_name: String,
    pub artifact_dir: PathBuf,
    pub outlier_threshold: f64,
    pub preprocessor: PreprocessorConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            test_split_ratio: 0.2,
            seed: 42,
            model_name: LINEAR_REGRESSION.to_string(),
            artifact_dir: PathBuf::from("artifacts"),
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            preprocessor: PreprocessorConfig::default(),
        }
    }
}

/// What one training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub tag: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub vocabulary: Vocabulary,
    pub evaluation: Evaluation,
    pub preprocessor_path: PathBuf,
    pub model_path: PathBuf,
    pub manifest_path: PathBuf,
}

pub struct Trainer {
    config: TrainConfig,
    metrics: LifecycleMetrics,
    logger: StructuredLogger,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            metrics: LifecycleMetrics::new(),
            logger: StructuredLogger::new("trainer"),
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn train(&self, raw: &[RawRecord]) -> LifecycleResult<TrainingOutcome> {
        self.train_at(raw, Utc::now().naive_utc())
    }

    /// Train and publish both artifacts under the tag derived from `now`
    pub fn train_at(&self, raw: &[RawRecord], now: NaiveDateTime) -> LifecycleResult<TrainingOutcome> {
        if raw.len() < MIN_TRAINING_ROWS {
            return Err(LifecycleError::InsufficientData {
                rows: raw.len(),
                required: MIN_TRAINING_ROWS,
            });
        }
        if let Some(pos) = raw.iter().position(|r| r.claim_price.is_none()) {
            return Err(LifecycleError::validation(format!(
                "row {} has no claim_price target",
                pos
            )));
        }

        let (train, test) = train_test_split(raw, self.config.test_split_ratio, self.config.seed)?;
        let vocabulary = Vocabulary::from_records(&train);
        debug!(train = train.len(), test = test.len(), breeds = vocabulary.len(), "Dataset split");

        let train_rows = preprocess(&train, &vocabulary)?;
        let test_rows = preprocess(&test, &vocabulary)?;

        // Test rows are only ever transformed with state fitted on train.
        let mut preprocessor = CategoryAwarePreprocessor::new(self.config.preprocessor.clone());
        let x_train = preprocessor.fit_transform(&train_rows)?;
        let x_test = preprocessor.transform(&test_rows)?;

        let y_train = targets(&train);
        let y_test = targets(&test);

        let mut model = create_model(&self.config.model_name)?;
        model.train(&x_train, &y_train)?;
        let y_pred = model.predict(&x_test)?;

        let evaluation = Evaluation::compute(&y_test, &y_pred, self.config.outlier_threshold);
        if !evaluation.under_predicted.is_empty() || !evaluation.over_predicted.is_empty() {
            warn!(
                under_predicted = evaluation.under_predicted.len(),
                over_predicted = evaluation.over_predicted.len(),
                threshold = self.config.outlier_threshold,
                "Outliers in hold-out evaluation"
            );
        }

        let tag = timestamp_tag(now);
        let dir = &self.config.artifact_dir;
        let preprocessor_path = dir.join(artifact_file_name(model.name(), &tag, "pkl"));
        let model_path = dir.join(artifact_file_name(model.name(), &tag, model.extension()));

        // Resolution keys on the preprocessor, so it is published last.
        let model_artifact = model.save(&model_path)?;
        let preprocessor_artifact = preprocessor.dump(&preprocessor_path)?;
        let manifest_path = ArtifactManifest {
            tag: tag.clone(),
            model_name: model.name().to_string(),
            preprocessor: preprocessor_artifact,
            model: model_artifact,
            created_at: Utc::now(),
        }
        .write(dir)?;

        self.metrics.inc_training_runs();
        self.logger.log_training_completed(
            &tag,
            model.name(),
            raw.len(),
            evaluation.mae,
            evaluation.mape,
            evaluation.rmse,
        );

        Ok(TrainingOutcome {
            tag,
            train_rows: train.len(),
            test_rows: test.len(),
            vocabulary,
            evaluation,
            preprocessor_path,
            model_path,
            manifest_path,
        })
    }
}

fn targets(records: &[RawRecord]) -> Vec<f64> {
    records.iter().filter_map(|r| r.claim_price).collect()
}

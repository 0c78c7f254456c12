//! Train, evaluate and predict
//!
//! Training fits the preprocessor on the train partition only and
//! publishes the preprocessor and model under one timestamp tag. Serving
//! loads that pair into a [`ServingContext`] and only ever transforms.

mod evaluate;
mod predict;
mod split;
mod statistics;
mod train;

pub use evaluate::{EvaluatedRow, Evaluation, DEFAULT_OUTLIER_THRESHOLD};
pub use predict::{round_price, AuditLog, ServingContext, PRICE_ROUNDING};
pub use split::{train_test_split, MIN_TRAINING_ROWS};
pub use statistics::{AgeGroupStats, BreedStatistics};
pub use train::{TrainConfig, Trainer, TrainingOutcome};

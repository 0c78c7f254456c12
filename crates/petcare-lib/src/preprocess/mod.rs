//! Category-aware preprocessing
//!
//! One canonical encoding contract for both training and serving:
//! `preprocess` performs stateless feature engineering against a breed
//! vocabulary, and [`CategoryAwarePreprocessor`] holds the state learned
//! from the training partition.

mod encoder;
mod features;

pub use encoder::{
    CategoryAwarePreprocessor, ColumnKind, ColumnSpec, ImputeStrategy, PreprocessorConfig,
    UNKNOWN_CATEGORY,
};
pub use features::{calculate_age_days, preprocess, Vocabulary};

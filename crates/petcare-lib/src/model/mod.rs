//! Regression model collaborator
//!
//! Training and serving only see the [`Regressor`] trait; concrete models
//! are built by name from a small registry.

mod linear;

pub use linear::{LinearRegressor, MODEL_NAME as LINEAR_REGRESSION};

use crate::artifact::PublishedArtifact;
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::FeatureVector;
use std::path::Path;

/// Trait for claim cost regressors
pub trait Regressor: Send + Sync {
    /// Registry name, also used as the artifact file prefix
    fn name(&self) -> &'static str;

    /// Extension the weights are persisted under
    fn extension(&self) -> &'static str;

    fn train(&mut self, features: &[FeatureVector], targets: &[f64]) -> LifecycleResult<()>;

    fn predict(&self, features: &[FeatureVector]) -> LifecycleResult<Vec<f64>>;

    fn save(&self, path: &Path) -> LifecycleResult<PublishedArtifact>;
}

/// Build an untrained model by registry name
pub fn create_model(name: &str) -> LifecycleResult<Box<dyn Regressor>> {
    match name {
        LINEAR_REGRESSION => Ok(Box::new(LinearRegressor::default())),
        other => Err(LifecycleError::validation(format!("unknown model '{}'", other))),
    }
}

/// Load persisted weights for the named model
pub fn load_model(name: &str, path: &Path) -> LifecycleResult<Box<dyn Regressor>> {
    match name {
        LINEAR_REGRESSION => Ok(Box::new(LinearRegressor::load(path)?)),
        other => Err(LifecycleError::validation(format!("unknown model '{}'", other))),
    }
}

//! Model lifecycle library for pet-insurance claim cost prediction
//!
//! This crate provides the core functionality for:
//! - Category-aware feature encoding shared by training and serving
//! - Timestamped artifact publishing and discovery
//! - Offline train/evaluate and online predict orchestration
//! - Dataset drift monitoring and retrain alerting
//! - Notification routing (email, HTTP retrain trigger)
//! - The periodic retrain scheduler
//! - Health checks and observability

pub mod artifact;
pub mod error;
pub mod health;
pub mod model;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod preprocess;
pub mod retrain;
pub mod retrieve;

pub use error::{LifecycleError, LifecycleResult, MonitoringCycleError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{LifecycleMetrics, StructuredLogger};

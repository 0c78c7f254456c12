//! Component health for the retrain scheduler process
//!
//! Readiness is withheld until the serving artifacts are loaded and the
//! scheduler loop is running, and again whenever a component is unhealthy:
//! the scheduler loop died or the serving artifacts failed verification.

use crate::error::LifecycleError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last operation failed but the component keeps running
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const SCHEDULER: &str = "scheduler";
    pub const MONITOR: &str = "monitor";
    pub const ARTIFACTS: &str = "artifacts";
    pub const NOTIFIER: &str = "notifier";
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into())).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into())).await;
    }

    /// Record why the serving pair could not be loaded.
    ///
    /// Tampered artifacts make the process unhealthy; missing ones only
    /// degrade it until a training run publishes a pair.
    pub async fn record_artifact_failure(&self, error: &LifecycleError) {
        match error {
            LifecycleError::ChecksumMismatch { .. } => {
                self.set_unhealthy(components::ARTIFACTS, error.to_string()).await
            }
            _ => self.set_degraded(components::ARTIFACTS, error.to_string()).await,
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Serving artifacts not loaded yet".to_string()),
            };
        }

        let mut unhealthy: Vec<String> = self
            .components
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.clone())
            .collect();
        unhealthy.sort();

        ReadinessResponse {
            ready: unhealthy.is_empty(),
            reason: (!unhealthy.is_empty()).then(|| format!("Unhealthy: {}", unhealthy.join(", "))),
        }
    }
}

//! HTTP API for health checks, metrics and the loaded artifact pair

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use petcare_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::LifecycleMetrics,
    pipeline::ServingContext,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: LifecycleMetrics,
    pub serving: Option<Arc<ServingContext>>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: LifecycleMetrics,
        serving: Option<Arc<ServingContext>>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            serving,
        }
    }
}

#[derive(Debug, Serialize)]
struct ArtifactInfo<'a> {
    tag: &'a str,
    model_name: &'a str,
    checksum_verified: bool,
    feature_width: Option<usize>,
}

/// 200 while operational, 503 once any component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode_text() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn artifacts(State(state): State<Arc<AppState>>) -> Response {
    match &state.serving {
        Some(ctx) => Json(ArtifactInfo {
            tag: ctx.tag(),
            model_name: ctx.model_name(),
            checksum_verified: ctx.checksum_verified(),
            feature_width: ctx.preprocessor().width(),
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no serving artifacts loaded" })),
        )
            .into_response(),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/artifacts", get(artifacts))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

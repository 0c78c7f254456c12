//! Retrain scheduler - unattended drift monitoring for claim cost models
//!
//! Loads the newest preprocessor/model pair, then watches the claims
//! dataset and asks the model server to retrain when it has grown enough.

use anyhow::{Context, Result};
use petcare_lib::{
    artifact::prune_artifacts,
    health::{components, HealthRegistry},
    monitor::{BaselineStore, DataAmountAlertPolicy, DriftMonitor},
    notify::{Channel, EmailSender, HttpRequestSender, NotificationRouter, Receiver},
    observability::{LifecycleMetrics, StructuredLogger},
    pipeline::ServingContext,
    retrain::RetrainScheduler,
    retrieve::CsvDataSource,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting retrain-scheduler");

    let config = config::SchedulerConfig::load()?;
    info!(
        data_dir = %config.data_dir.display(),
        artifact_dir = %config.artifact_dir.display(),
        "Scheduler configured"
    );

    let health_registry = HealthRegistry::new();
    for component in [
        components::SCHEDULER,
        components::MONITOR,
        components::ARTIFACTS,
        components::NOTIFIER,
    ] {
        health_registry.register(component).await;
    }

    let metrics = LifecycleMetrics::new();
    let logger = StructuredLogger::new("retrain-scheduler");

    let serving = load_serving_context(&config, &health_registry).await?;

    let monitor = DriftMonitor::open(
        Box::new(DataAmountAlertPolicy::new(config.growth_threshold)),
        BaselineStore::new(&config.baseline_path),
    )
    .context("Failed to open drift monitor")?;

    let router = build_router(&config, &health_registry).await?;
    let scheduler = Arc::new(
        RetrainScheduler::new(
            Arc::new(CsvDataSource::new(&config.data_dir)),
            monitor,
            router,
            config.scheduler_settings(),
        )
        .with_health(health_registry.clone()),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = scheduler.spawn(shutdown_rx);
    logger.log_startup(SCHEDULER_VERSION, config.interval_secs, &config.dataset_query);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        serving,
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // The in-flight cycle, if any, finishes before the loop observes this.
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Scheduler supervisor ended abnormally");
        health_registry
            .set_unhealthy(components::SCHEDULER, e.to_string())
            .await;
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Resolve and load the serving pair; fatal when artifacts are required
async fn load_serving_context(
    config: &config::SchedulerConfig,
    health: &HealthRegistry,
) -> Result<Option<Arc<ServingContext>>> {
    match prune_artifacts(&config.artifact_dir, &config.model_name, config.keep_artifact_runs) {
        Ok(removed) if !removed.is_empty() => info!(removed = removed.len(), "Old training runs pruned"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Artifact pruning failed"),
    }

    match ServingContext::load(&config.artifact_dir, &config.model_name) {
        Ok(ctx) => {
            health.set_healthy(components::ARTIFACTS).await;
            Ok(Some(Arc::new(ctx)))
        }
        Err(e) => {
            health.record_artifact_failure(&e).await;
            if config.require_artifacts {
                return Err(e).context("Failed to load serving artifacts");
            }
            warn!(error = %e, "Starting without serving artifacts");
            Ok(None)
        }
    }
}

async fn build_router(config: &config::SchedulerConfig, health: &HealthRegistry) -> Result<NotificationRouter> {
    let mut router = NotificationRouter::new();

    match config.email_config() {
        Some(email) => {
            let sender = EmailSender::with_config(email).context("Failed to configure email sender")?;
            router = router.with_route(
                Channel::Operator,
                Arc::new(sender),
                Receiver::Email(config.operator_email.clone()),
            );
        }
        None => {
            warn!("SMTP not configured, failure reports will only be logged");
            health
                .set_degraded(components::NOTIFIER, "operator email not configured")
                .await;
        }
    }

    if config.retrain_endpoint.is_empty() {
        warn!("Retrain endpoint not configured, triggers will fail and be reported");
        health
            .set_degraded(components::NOTIFIER, "retrain endpoint not configured")
            .await;
    } else {
        let receiver = Receiver::http_endpoint(&config.retrain_endpoint)?;
        let sender = HttpRequestSender::new(config.step_timeout())?;
        router = router.with_route(Channel::RetrainTrigger, Arc::new(sender), receiver);
    }

    Ok(router)
}

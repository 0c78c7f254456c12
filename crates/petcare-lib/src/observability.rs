//! Observability for the model lifecycle
//!
//! Provides:
//! - Prometheus metrics (cycle latency, cycle outcomes, retrain triggers,
//!   notifications, baseline size, serving artifact tag)
//! - Structured JSON logging of lifecycle milestones with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Cycle latency buckets in seconds; cycles include network calls
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

static GLOBAL_METRICS: OnceLock<LifecycleMetricsInner> = OnceLock::new();

struct LifecycleMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_total: IntCounterVec,
    cycle_failures_total: IntCounter,
    retrain_triggers_total: IntCounter,
    notifications_total: IntCounterVec,
    baseline_rows: IntGauge,
    serving_artifact_info: GaugeVec,
    training_runs_total: IntCounter,
}

impl LifecycleMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "petcare_monitor_cycle_latency_seconds",
                "Wall time of one monitoring cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_total: register_int_counter_vec!(
                "petcare_monitor_cycles_total",
                "Monitoring cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register cycles_total"),

            cycle_failures_total: register_int_counter!(
                "petcare_monitor_cycle_failures_total",
                "Monitoring cycles that failed and were reported"
            )
            .expect("Failed to register cycle_failures_total"),

            retrain_triggers_total: register_int_counter!(
                "petcare_retrain_triggers_total",
                "Retraining requests sent to the trigger endpoint"
            )
            .expect("Failed to register retrain_triggers_total"),

            notifications_total: register_int_counter_vec!(
                "petcare_notifications_total",
                "Notifications by channel and result",
                &["channel", "result"]
            )
            .expect("Failed to register notifications_total"),

            baseline_rows: register_int_gauge!(
                "petcare_monitor_baseline_rows",
                "Row count of the current baseline snapshot"
            )
            .expect("Failed to register baseline_rows"),

            serving_artifact_info: register_gauge_vec!(
                "petcare_serving_artifact_info",
                "Timestamp tag of the loaded preprocessor/model pair",
                &["tag", "model"]
            )
            .expect("Failed to register serving_artifact_info"),

            training_runs_total: register_int_counter!(
                "petcare_training_runs_total",
                "Completed training runs"
            )
            .expect("Failed to register training_runs_total"),
        }
    }
}

/// Lightweight handle to the process-wide metrics; clones share state
#[derive(Clone)]
pub struct LifecycleMetrics {
    _private: (),
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(LifecycleMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &LifecycleMetricsInner {
        GLOBAL_METRICS.get_or_init(LifecycleMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycle(&self, outcome: &str) {
        self.inner().cycles_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_cycle_failures(&self) {
        self.inner().cycle_failures_total.inc();
    }

    pub fn inc_retrain_triggers(&self) {
        self.inner().retrain_triggers_total.inc();
    }

    pub fn inc_notification(&self, channel: &str, success: bool) {
        let result = if success { "sent" } else { "failed" };
        self.inner()
            .notifications_total
            .with_label_values(&[channel, result])
            .inc();
    }

    pub fn set_baseline_rows(&self, rows: i64) {
        self.inner().baseline_rows.set(rows);
    }

    pub fn set_serving_artifact(&self, tag: &str, model: &str) {
        self.inner().serving_artifact_info.reset();
        self.inner()
            .serving_artifact_info
            .with_label_values(&[tag, model])
            .set(1.0);
    }

    pub fn inc_training_runs(&self) {
        self.inner().training_runs_total.inc();
    }

    /// Every registered metric in the Prometheus text exposition format
    pub fn encode_text(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for lifecycle milestones
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64, query: &str) {
        info!(
            event = "scheduler_started",
            service = %self.service,
            version = %version,
            interval_secs = interval_secs,
            query = %query,
            "Retrain scheduler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scheduler_shutdown",
            service = %self.service,
            reason = %reason,
            "Retrain scheduler shutting down"
        );
    }

    pub fn log_monitor_cycle(&self, previous_rows: Option<usize>, new_rows: usize, triggered: bool) {
        info!(
            event = "monitor_cycle",
            service = %self.service,
            previous_rows = ?previous_rows,
            new_rows = new_rows,
            triggered = triggered,
            "Monitoring cycle evaluated"
        );
    }

    pub fn log_retrain_requested(&self, channel: &str, new_rows: usize) {
        warn!(
            event = "retrain_requested",
            service = %self.service,
            channel = %channel,
            new_rows = new_rows,
            "Data growth threshold reached, retraining requested"
        );
    }

    pub fn log_cycle_failed(&self, kind: &str, message: &str, notified: bool) {
        error!(
            event = "cycle_failed",
            service = %self.service,
            error_kind = %kind,
            error = %message,
            operator_notified = notified,
            "Monitoring cycle failed"
        );
    }

    pub fn log_training_completed(&self, tag: &str, model: &str, rows: usize, mae: f64, mape: f64, rmse: f64) {
        info!(
            event = "training_completed",
            service = %self.service,
            tag = %tag,
            model = %model,
            rows = rows,
            mae = mae,
            mape = mape,
            rmse = rmse,
            "Training run completed"
        );
    }

    pub fn log_artifacts_loaded(&self, tag: &str, preprocessor: &str, model: &str, verified: bool) {
        info!(
            event = "artifacts_loaded",
            service = %self.service,
            tag = %tag,
            preprocessor = %preprocessor,
            model = %model,
            checksum_verified = verified,
            "Serving artifacts loaded"
        );
    }
}

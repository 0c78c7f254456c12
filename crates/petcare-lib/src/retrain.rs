//! Periodic retrain scheduler
//!
//! One cycle: retrieve a snapshot, let the drift monitor decide against the
//! previous baseline (which it then replaces), and request retraining when
//! the policy fires. Any failure inside a cycle is reported to the operator
//! by email and swallowed so the loop keeps running.

use crate::error::MonitoringCycleError;
use crate::health::{components, HealthRegistry};
use crate::monitor::{AlertEvent, DriftMonitor};
use crate::notify::{Channel, NotificationMessage, NotificationRouter, Reporter};
use crate::observability::{LifecycleMetrics, StructuredLogger};
use crate::retrieve::DataSource;
use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_QUERY: &str = "pet_insurance_claims";

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Dataset query handed to the data source each cycle
    pub query: String,
    /// Upper bound for each blocking step of a cycle
    pub step_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            query: DEFAULT_QUERY.to_string(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    BaselineInitialized { rows: usize },
    Quiet { previous_rows: usize, new_rows: usize },
    RetrainRequested { previous_rows: usize, new_rows: usize },
    Failed { step: Option<&'static str>, operator_notified: bool },
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::BaselineInitialized { .. } => "baseline_initialized",
            CycleOutcome::Quiet { .. } => "quiet",
            CycleOutcome::RetrainRequested { .. } => "retrain_requested",
            CycleOutcome::Failed { .. } => "failed",
        }
    }
}

pub struct RetrainScheduler {
    source: Arc<dyn DataSource>,
    monitor: DriftMonitor,
    router: NotificationRouter,
    reporter: Reporter,
    settings: SchedulerSettings,
    health: Option<HealthRegistry>,
    metrics: LifecycleMetrics,
    logger: StructuredLogger,
    // Cycles never overlap, even when run_cycle is called outside the loop.
    cycle_lock: Mutex<()>,
}

impl RetrainScheduler {
    pub fn new(
        source: Arc<dyn DataSource>,
        monitor: DriftMonitor,
        router: NotificationRouter,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            source,
            monitor,
            router,
            reporter: Reporter::new(),
            settings,
            health: None,
            metrics: LifecycleMetrics::new(),
            logger: StructuredLogger::new("retrain-scheduler"),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn monitor(&self) -> &DriftMonitor {
        &self.monitor
    }

    /// Run the loop on its own task and watch it.
    ///
    /// The scheduler component turns unhealthy if the loop panics or
    /// loses its shutdown channel.
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let health = self.health.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(self.run(shutdown)).await {
                error!(error = %e, "Retrain scheduler loop aborted");
                if let Some(health) = health {
                    health
                        .set_unhealthy(components::SCHEDULER, format!("scheduler loop aborted: {}", e))
                        .await;
                }
            }
        })
    }

    /// Run cycles at the configured interval until shutdown.
    ///
    /// The first cycle runs immediately. A shutdown received mid-cycle
    /// takes effect once that cycle has finished.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            query = %self.settings.query,
            "Starting retrain scheduler"
        );
        if let Some(health) = &self.health {
            health.set_healthy(components::SCHEDULER).await;
        }

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    debug!(outcome = outcome.as_str(), "Cycle finished");
                }
                signal = shutdown.recv() => {
                    if let Err(RecvError::Closed) = signal {
                        warn!("Shutdown channel closed, stopping retrain scheduler");
                        if let Some(health) = &self.health {
                            health
                                .set_unhealthy(components::SCHEDULER, "shutdown channel closed")
                                .await;
                        }
                    } else {
                        info!("Shutting down retrain scheduler");
                    }
                    break;
                }
            }
        }
    }

    /// Execute one cycle; never returns an error
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        let start = Instant::now();

        let outcome = match self.try_cycle().await {
            Ok(outcome) => {
                self.set_monitor_health(None).await;
                outcome
            }
            Err(e) => self.handle_failure(e).await,
        };

        self.metrics.observe_cycle_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_cycle(outcome.as_str());
        outcome
    }

    async fn try_cycle(&self) -> Result<CycleOutcome> {
        let query = self.settings.query.clone();
        let snapshot = self
            .bounded("retrieve", self.source.retrieve(&query))
            .await?;

        let event: AlertEvent = self
            .bounded("observe", async {
                self.monitor.observe(snapshot).await.map_err(anyhow::Error::from)
            })
            .await?;

        self.metrics.set_baseline_rows(event.new_rows as i64);
        self.logger
            .log_monitor_cycle(event.previous_rows, event.new_rows, event.triggered);

        let previous_rows = match event.previous_rows {
            None => return Ok(CycleOutcome::BaselineInitialized { rows: event.new_rows }),
            Some(rows) => rows,
        };
        if !event.triggered {
            return Ok(CycleOutcome::Quiet {
                previous_rows,
                new_rows: event.new_rows,
            });
        }

        let message = NotificationMessage::params([
            ("reason", "data_growth".to_string()),
            ("policy", self.monitor.policy_name().to_string()),
            ("previous_rows", previous_rows.to_string()),
            ("new_rows", event.new_rows.to_string()),
        ]);
        self.bounded("trigger", self.router.notify(Channel::RetrainTrigger, &message))
            .await?;

        self.metrics.inc_retrain_triggers();
        self.logger
            .log_retrain_requested(Channel::RetrainTrigger.as_str(), event.new_rows);

        Ok(CycleOutcome::RetrainRequested {
            previous_rows,
            new_rows: event.new_rows,
        })
    }

    /// Bound a step by the configured timeout and tag failures with the step
    async fn bounded<T, F>(&self, step: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.step_timeout, fut).await {
            Ok(result) => result.context(MonitoringCycleError { step }),
            Err(_) => Err::<T, _>(anyhow!("timed out after {:?}", self.settings.step_timeout))
                .context(MonitoringCycleError { step }),
        }
    }

    async fn handle_failure(&self, error: anyhow::Error) -> CycleOutcome {
        let step = error.downcast_ref::<MonitoringCycleError>().map(|e| e.step);
        let report = self.reporter.generate(&error);

        let operator_notified = match self
            .bounded("report", self.router.notify(Channel::Operator, &report))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to deliver failure report");
                false
            }
        };

        self.metrics.inc_cycle_failures();
        self.logger.log_cycle_failed(
            MonitoringCycleError::KIND,
            &format!("{:#}", error),
            operator_notified,
        );
        self.set_monitor_health(Some(format!("{:#}", error))).await;

        CycleOutcome::Failed {
            step,
            operator_notified,
        }
    }

    async fn set_monitor_health(&self, failure: Option<String>) {
        if let Some(health) = &self.health {
            match failure {
                None => health.set_healthy(components::MONITOR).await,
                Some(message) => health.set_degraded(components::MONITOR, message).await,
            }
        }
    }
}

//! Scheduler configuration
//!
//! Read from an optional `retrain-scheduler.toml` and `RETRAIN_*`
//! environment variables, environment taking precedence.

use anyhow::{Context, Result};
use petcare_lib::notify::EmailSenderConfig;
use petcare_lib::retrain::SchedulerSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "retrain-scheduler";
const ENV_PREFIX: &str = "RETRAIN";

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Directory holding `<query>.csv` snapshots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_dataset_query")]
    pub dataset_query: String,

    #[serde(default = "default_baseline_path")]
    pub baseline_path: PathBuf,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Training runs kept in the artifact directory
    #[serde(default = "default_keep_artifact_runs")]
    pub keep_artifact_runs: usize,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_growth_threshold")]
    pub growth_threshold: usize,

    #[serde(default)]
    pub smtp_server: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: String,

    #[serde(default)]
    pub smtp_password: String,

    /// Receiver of failure reports
    #[serde(default)]
    pub operator_email: String,

    /// Model server endpoint that starts retraining
    #[serde(default)]
    pub retrain_endpoint: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Refuse to start without a loadable preprocessor/model pair
    #[serde(default = "default_require_artifacts")]
    pub require_artifacts: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_dataset_query() -> String {
    petcare_lib::retrain::DEFAULT_QUERY.to_string()
}

fn default_baseline_path() -> PathBuf {
    PathBuf::from("data/baseline.csv")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_model_name() -> String {
    petcare_lib::model::LINEAR_REGRESSION.to_string()
}

fn default_keep_artifact_runs() -> usize {
    5
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_growth_threshold() -> usize {
    petcare_lib::monitor::DEFAULT_MIN_NEW_ROWS
}

fn default_smtp_port() -> u16 {
    587
}

fn default_api_port() -> u16 {
    8080
}

fn default_step_timeout_secs() -> u64 {
    60
}

fn default_require_artifacts() -> bool {
    true
}

impl SchedulerConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    /// `env` replaces the process environment when given
    pub fn load_with_env(env: Option<config::Map<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid scheduler configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be positive");
        }
        if self.step_timeout_secs == 0 {
            anyhow::bail!("step_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(self.interval_secs),
            query: self.dataset_query.clone(),
            step_timeout: Duration::from_secs(self.step_timeout_secs),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// SMTP settings, if enough is configured to send mail
    pub fn email_config(&self) -> Option<EmailSenderConfig> {
        if self.smtp_server.is_empty() || self.smtp_username.is_empty() || self.operator_email.is_empty() {
            return None;
        }
        Some(EmailSenderConfig {
            smtp_server: self.smtp_server.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            timeout: self.step_timeout(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::load_with_env(env(&[])).unwrap();
        assert_eq!(config.interval_secs, 3600);
        assert_eq!(config.growth_threshold, 30);
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.dataset_query, "pet_insurance_claims");
        assert!(config.require_artifacts);
        assert!(config.email_config().is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = SchedulerConfig::load_with_env(env(&[
            ("RETRAIN_INTERVAL_SECS", "60"),
            ("RETRAIN_GROWTH_THRESHOLD", "10"),
            ("RETRAIN_SMTP_SERVER", "smtp.example.com"),
            ("RETRAIN_SMTP_USERNAME", "alerts@example.com"),
            ("RETRAIN_OPERATOR_EMAIL", "ops@example.com"),
            ("RETRAIN_REQUIRE_ARTIFACTS", "false"),
        ]))
        .unwrap();

        assert_eq!(config.scheduler_settings().interval, Duration::from_secs(60));
        assert_eq!(config.growth_threshold, 10);
        assert!(!config.require_artifacts);
        let email = config.email_config().unwrap();
        assert_eq!(email.smtp_server, "smtp.example.com");
        assert_eq!(email.port, 587);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(SchedulerConfig::load_with_env(env(&[("RETRAIN_INTERVAL_SECS", "0")])).is_err());
    }
}

//! Failure reports for the operator email channel

use super::NotificationMessage;
use crate::error::{LifecycleError, MonitoringCycleError};
use chrono::{DateTime, Local, TimeZone};

const WHEN_FORMAT: &str = "%Y-%m-%d, %H:%M:%S";

#[derive(Debug, Clone, Default)]
pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, error: &anyhow::Error) -> NotificationMessage {
        self.generate_at(error, Local::now())
    }

    /// Subject carries the time; content carries time, kind, message and
    /// the full cause chain.
    pub fn generate_at<Tz: TimeZone>(&self, error: &anyhow::Error, when: DateTime<Tz>) -> NotificationMessage
    where
        Tz::Offset: std::fmt::Display,
    {
        let when = when.format(WHEN_FORMAT).to_string();
        let kind = error_kind(error);
        let cause = root_kind(error);

        let trace = error
            .chain()
            .enumerate()
            .map(|(i, e)| format!("  {}: {}", i, e))
            .collect::<Vec<_>>()
            .join("\n");

        let subject = format!("[Claim cost pipeline failure ({})]", when);
        let content = format!(
            "Occurred at: {}\nError type: {}\nCause type: {}\nError message: {}\nTrace:\n{}\n",
            when, kind, cause, error, trace
        );
        NotificationMessage::email(subject, content)
    }
}

fn error_kind(error: &anyhow::Error) -> &'static str {
    if error.downcast_ref::<MonitoringCycleError>().is_some() {
        MonitoringCycleError::KIND
    } else {
        root_kind(error)
    }
}

fn root_kind(error: &anyhow::Error) -> &'static str {
    error
        .downcast_ref::<LifecycleError>()
        .or_else(|| error.chain().find_map(|e| e.downcast_ref::<LifecycleError>()))
        .map(LifecycleError::kind)
        .unwrap_or("Error")
}

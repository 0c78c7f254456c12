//! Error taxonomy for the model lifecycle
//!
//! Training and inference errors bubble up to the caller. Scheduler cycle
//! errors are wrapped as monitoring cycle failures, reported, and contained.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used by the lifecycle contracts.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed training or request data.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Too few rows to split into train and test partitions.
    #[error("insufficient data: {rows} rows supplied, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    /// `transform` called on a preprocessor that was never fitted.
    #[error("preprocessor is not fitted; call fit before transform")]
    NotFitted,

    /// A configured or required column is absent from the input.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// Observation date precedes the birth date.
    #[error("invalid age: observed on {observed} before birth on {birth}")]
    InvalidAge { birth: String, observed: String },

    /// The resolver found no artifact for the requested kind.
    #[error("no {kind} artifact matching '{prefix}*.{extension}' under {root:?}")]
    ArtifactNotFound {
        root: PathBuf,
        kind: String,
        prefix: String,
        extension: String,
    },

    /// A persisted artifact does not match its recorded checksum.
    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// An aggregate lookup had no rows for the requested key.
    #[error("no rows for group {0}")]
    UnknownGroup(String),

    /// A receiver does not carry the destination field a sender needs.
    #[error("receiver has no {0} destination")]
    Receiver(&'static str),

    /// A sender could not deliver a message.
    #[error("notification failed: {0}")]
    Notification(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Context attached to any failure inside a scheduled monitoring cycle.
///
/// Cycle failures are reported and contained rather than propagated.
#[derive(Debug, Error)]
#[error("monitoring cycle failed during {step}")]
pub struct MonitoringCycleError {
    pub step: &'static str,
}

impl MonitoringCycleError {
    pub const KIND: &'static str = "MonitoringCycleError";
}

impl LifecycleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short stable name for the error kind, used in reports and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::InsufficientData { .. } => "InsufficientDataError",
            Self::NotFitted => "NotFittedError",
            Self::MissingColumn(_) => "MissingColumnError",
            Self::InvalidAge { .. } => "InvalidAgeError",
            Self::ArtifactNotFound { .. } => "ArtifactNotFoundError",
            Self::ChecksumMismatch { .. } => "ChecksumMismatchError",
            Self::UnknownGroup(_) => "UnknownGroupError",
            Self::Receiver(_) => "ReceiverError",
            Self::Notification(_) => "NotificationError",
            Self::Io { .. } => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Task(_) => "TaskError",
        }
    }

    /// Whether a service edge should answer this error with a not-found response.
    pub fn is_client_visible_not_found(&self) -> bool {
        matches!(self, Self::UnknownGroup(_) | Self::ArtifactNotFound { .. })
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<csv::Error> for LifecycleError {
    fn from(e: csv::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

//! Notification routing
//!
//! A [`Sender`] delivers a [`NotificationMessage`] to a [`Receiver`]. The
//! [`NotificationRouter`] binds each logical [`Channel`] to one sender and
//! one receiver so the scheduler never deals with transports directly.

mod email;
mod http;
mod report;

pub use email::{EmailSender, EmailSenderConfig};
pub use http::HttpRequestSender;
pub use report::Reporter;

use crate::error::{LifecycleError, LifecycleResult};
use crate::observability::LifecycleMetrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NotificationMessage {
    Email { subject: String, content: String },
    /// Sent as the query string of the HTTP trigger
    Params(BTreeMap<String, String>),
}

impl NotificationMessage {
    pub fn email(subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Email {
            subject: subject.into(),
            content: content.into(),
        }
    }

    pub fn params<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Params(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Tagged destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    Email(String),
    Phone(String),
    HttpEndpoint(Url),
}

impl Receiver {
    pub fn http_endpoint(url: &str) -> LifecycleResult<Self> {
        Url::parse(url)
            .map(Self::HttpEndpoint)
            .map_err(|e| LifecycleError::validation(format!("invalid endpoint '{}': {}", url, e)))
    }

    pub fn require_email(&self) -> LifecycleResult<&str> {
        match self {
            Self::Email(address) => Ok(address),
            _ => Err(LifecycleError::Receiver("email")),
        }
    }

    pub fn require_phone(&self) -> LifecycleResult<&str> {
        match self {
            Self::Phone(number) => Ok(number),
            _ => Err(LifecycleError::Receiver("phone")),
        }
    }

    pub fn require_http_endpoint(&self) -> LifecycleResult<&Url> {
        match self {
            Self::HttpEndpoint(url) => Ok(url),
            _ => Err(LifecycleError::Receiver("http endpoint")),
        }
    }
}

impl std::fmt::Display for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Receiver::Email(a) => write!(f, "email:{}", a),
            Receiver::Phone(n) => write!(f, "phone:{}", n),
            Receiver::HttpEndpoint(u) => write!(f, "http:{}", u),
        }
    }
}

/// Delivery capability. Implementations validate the receiver before any I/O.
#[async_trait]
pub trait Sender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &NotificationMessage, receiver: &Receiver) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Human operator, receives failure reports
    Operator,
    /// Model server endpoint that starts retraining
    RetrainTrigger,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Operator => "operator",
            Channel::RetrainTrigger => "retrain_trigger",
        }
    }
}

struct Route {
    sender: Arc<dyn Sender>,
    receiver: Receiver,
}

pub struct NotificationRouter {
    routes: HashMap<Channel, Route>,
    metrics: LifecycleMetrics,
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            metrics: LifecycleMetrics::new(),
        }
    }

    pub fn with_route(mut self, channel: Channel, sender: Arc<dyn Sender>, receiver: Receiver) -> Self {
        self.routes.insert(channel, Route { sender, receiver });
        self
    }

    pub fn has_route(&self, channel: Channel) -> bool {
        self.routes.contains_key(&channel)
    }

    pub async fn notify(&self, channel: Channel, message: &NotificationMessage) -> Result<()> {
        let route = self
            .routes
            .get(&channel)
            .with_context(|| format!("No route configured for channel {}", channel.as_str()))?;

        let result = route
            .sender
            .send(message, &route.receiver)
            .await
            .with_context(|| {
                format!(
                    "Failed to notify {} via {} sender",
                    channel.as_str(),
                    route.sender.name()
                )
            });

        self.metrics.inc_notification(channel.as_str(), result.is_ok());
        match &result {
            Ok(()) => debug!(channel = channel.as_str(), receiver = %route.receiver, "Notification sent"),
            Err(e) => warn!(channel = channel.as_str(), error = %e, "Notification failed"),
        }
        result
    }
}

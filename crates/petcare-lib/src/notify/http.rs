//! HTTP POST to the retraining trigger endpoint

use super::{NotificationMessage, Receiver, Sender};
use crate::error::LifecycleError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

pub struct HttpRequestSender {
    client: Client,
}

impl HttpRequestSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Sender for HttpRequestSender {
    fn name(&self) -> &'static str {
        "http"
    }

    /// Parameters travel in the query string; any non-2xx status is an error.
    async fn send(&self, message: &NotificationMessage, receiver: &Receiver) -> Result<()> {
        let url = receiver.require_http_endpoint()?;
        let NotificationMessage::Params(params) = message else {
            return Err(LifecycleError::validation("http sender needs a parameter map").into());
        };

        let response = self
            .client
            .post(url.clone())
            .query(params)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Trigger endpoint error ({}): {}", status, body);
        }

        info!(endpoint = %url, status = status.as_u16(), "Trigger request accepted");
        Ok(())
    }
}

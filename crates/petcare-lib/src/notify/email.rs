//! Authenticated STARTTLS SMTP delivery

use super::{NotificationMessage, Receiver, Sender};
use crate::error::LifecycleError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSenderConfig {
    pub smtp_server: String,
    pub port: u16,
    /// Login name, also used as the From address
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl Default for EmailSenderConfig {
    fn default() -> Self {
        Self {
            smtp_server: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct EmailSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    pub fn with_config(config: EmailSenderConfig) -> Result<Self> {
        let from: Mailbox = config
            .username
            .parse()
            .with_context(|| format!("Invalid sender address '{}'", config.username))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .with_context(|| format!("Failed to configure SMTP relay {}", config.smtp_server))?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .timeout(Some(config.timeout))
            .build();

        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Sender for EmailSender {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, message: &NotificationMessage, receiver: &Receiver) -> Result<()> {
        let to: Mailbox = receiver
            .require_email()?
            .parse()
            .context("Invalid receiver address")?;

        let NotificationMessage::Email { subject, content } = message else {
            return Err(LifecycleError::validation("email sender needs a subject and content").into());
        };

        let email = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(content.clone())
            .context("Failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;

        info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> EmailSender {
        EmailSender::with_config(EmailSenderConfig {
            username: "alerts@example.com".into(),
            ..EmailSenderConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_from_address_rejected() {
        assert!(EmailSender::with_config(EmailSenderConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_email_receiver_before_connecting() {
        let err = sender()
            .send(
                &NotificationMessage::email("s", "c"),
                &Receiver::Phone("010".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::Receiver("email"))
        ));
    }

    #[tokio::test]
    async fn test_rejects_param_message() {
        let err = sender()
            .send(
                &NotificationMessage::params([("a", "b")]),
                &Receiver::Email("ops@example.com".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::Validation(_))
        ));
    }
}

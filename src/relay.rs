//! Outbound mail relay
//!
//! The core treats delivery as an opaque collaborator: it hands a
//! normalized payload to a [`Relay`] and records the sent copy itself.
//! [`SmtpRelay`] performs real SMTP submission; [`LogRelay`] only logs,
//! for single-process demo mode without an upstream server.

use crate::config::SmtpConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

/// Credentials forwarded to the relay for submission.
#[derive(Debug, Clone)]
pub struct RelayAuth {
    pub username: String,
    pub password: String,
}

/// Normalized outbound payload.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    /// Normalized recipient list, comma-joined.
    pub to: String,
    pub subject: String,
    pub text: String,
    pub auth: Option<RelayAuth>,
}

/// Receipt returned by a successful delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Transport response code, when the transport provides one.
    pub response: Option<String>,
}

#[async_trait]
pub trait Relay: Send + Sync {
    /// Submit one outbound message.
    ///
    /// # Errors
    ///
    /// Delivery failures surface as [`Error::Remote`].
    async fn send_mail(&self, mail: &OutgoingMail) -> Result<DeliveryReceipt>;
}

/// SMTP submission through a configured relay host.
pub struct SmtpRelay {
    config: SmtpConfig,
}

impl SmtpRelay {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn credentials(&self, mail: &OutgoingMail) -> Option<Credentials> {
        if let Some(auth) = &mail.auth {
            return Some(Credentials::new(
                auth.username.clone(),
                auth.password.clone(),
            ));
        }
        match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                Some(Credentials::new(username.clone(), password.clone()))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn send_mail(&self, mail: &OutgoingMail) -> Result<DeliveryReceipt> {
        let mut builder = Message::builder()
            .from(
                mail.from
                    .parse()
                    .map_err(|e| Error::Remote(format!("invalid from address: {e}")))?,
            )
            .subject(mail.subject.clone());

        for entry in mail.to.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            builder = builder.to(entry
                .parse()
                .map_err(|e| Error::Remote(format!("invalid recipient '{entry}': {e}")))?);
        }

        let message = builder
            .body(mail.text.clone())
            .map_err(|e| Error::Remote(format!("failed to build message: {e}")))?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
            .map_err(|e| Error::Remote(format!("SMTP relay setup failed: {e}")))?
            .port(self.config.port);
        if let Some(credentials) = self.credentials(mail) {
            transport = transport.credentials(credentials);
        }

        let response = transport
            .build()
            .send(message)
            .await
            .map_err(|e| Error::Remote(format!("SMTP send failed: {e}")))?;

        info!("submitted mail to relay for {}", mail.to);
        Ok(DeliveryReceipt {
            response: Some(response.code().to_string()),
        })
    }
}

/// Relay that logs instead of delivering.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRelay;

#[async_trait]
impl Relay for LogRelay {
    async fn send_mail(&self, mail: &OutgoingMail) -> Result<DeliveryReceipt> {
        debug!("log relay: from={} to={}", mail.from, mail.to);
        info!("outbound mail (not delivered): {:?}", mail.subject);
        Ok(DeliveryReceipt { response: None })
    }
}

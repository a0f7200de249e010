//! Mail transport seam.
//!
//! The dispatcher talks to a [`Mailer`] trait rather than lettre directly,
//! so tests can capture outgoing mail instead of opening sockets. The real
//! implementation is an async SMTP transport configured from the
//! environment.

use crate::config::mail::MailConfig;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::Mailbox,
    transport::smtp::authentication::Credentials,
};

/// One email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Delivery transport used by the notification dispatcher.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers one email.
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Lettre-backed SMTP transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport from SMTP settings.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let from = config.from_address.parse().map_err(|e| Error::Mail {
            message: format!("Invalid MAIL_FROM address: {e}"),
        })?;

        // builder_dangerous skips TLS; only for local capture servers
        let mut builder = if config.smtp_insecure {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host).map_err(|e| {
                Error::Mail {
                    message: format!("SMTP relay setup failed: {e}"),
                }
            })?
        }
        .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let to = email.to.parse().map_err(|e| Error::Mail {
            message: format!("Invalid recipient address '{}': {e}", email.to),
        })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .body(email.body)
            .map_err(|e| Error::Mail {
                message: format!("Failed to build email: {e}"),
            })?;

        self.transport.send(message).await.map_err(|e| Error::Mail {
            message: format!("SMTP delivery failed: {e}"),
        })?;

        Ok(())
    }
}

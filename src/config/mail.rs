//! Mail transport configuration from environment variables.
//!
//! Reads SMTP connection settings with development-friendly fallbacks so a
//! local run works against a capture server (e.g. mailpit on port 1025 with
//! `SMTP_INSECURE=1`) without further setup.

use crate::errors::Result;

/// SMTP settings consumed by the notification dispatcher's mailer.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// SMTP relay hostname
    pub smtp_host: String,
    /// SMTP relay port
    pub smtp_port: u16,
    /// Optional SMTP credentials
    pub smtp_username: Option<String>,
    /// Optional SMTP credentials
    pub smtp_password: Option<String>,
    /// Skip TLS entirely; local capture servers only
    pub smtp_insecure: bool,
    /// From address stamped on every outgoing email
    pub from_address: String,
}

impl MailConfig {
    /// Loads mail settings from the environment, falling back to local
    /// development defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(25),
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            smtp_insecure: std::env::var("SMTP_INSECURE")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            from_address: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "noreply@mnotify.com".to_string()),
        })
    }
}

// Outgoing email: an SMTP transport, a logging fallback and message templates.

pub mod templates;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::EmailConfig;

/// A rendered email with plain text and HTML alternatives.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig, host: &str) -> anyhow::Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .with_context(|| format!("Failed to configure STARTTLS relay for {}", host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from_address
            .parse::<Mailbox>()
            .with_context(|| format!("DEFAULT_FROM_EMAIL '{}' is not a valid address", config.from_address))?;

        Ok(SmtpMailer { transport: builder.build(), from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let to = message
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("Recipient '{}' is not a valid address", message.to))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(message.text_body, message.html_body))
            .context("Failed to build email message")?;

        self.transport.send(email).await.context("SMTP delivery failed")?;
        info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Used when no SMTP host is configured: emails are written to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text_body,
            "Email delivery is not configured; logging message instead"
        );
        Ok(())
    }
}

/// Picks the SMTP transport when `EMAIL_HOST` is set.
pub fn from_config(config: &EmailConfig) -> anyhow::Result<std::sync::Arc<dyn Mailer>> {
    match &config.host {
        Some(host) => {
            info!(host = %host, port = config.port, tls = config.use_tls, "Using SMTP mailer");
            Ok(std::sync::Arc::new(SmtpMailer::new(config, host)?))
        }
        None => {
            info!("EMAIL_HOST not set, emails will be logged");
            Ok(std::sync::Arc::new(LogMailer))
        }
    }
}

//! Email Channel — async SMTP sending via lettre.
//!
//! Reminders go out as multipart/alternative (plain text + HTML). Supports
//! Gmail, Outlook and custom STARTTLS relays.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use remindr_core::config::EmailChannelConfig;
use remindr_core::error::{RemindrError, Result};
use remindr_core::traits::NotifyChannel;

/// Email channel — SMTP only, one transport reused across sends.
pub struct EmailChannel {
    config: EmailChannelConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: EmailChannelConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(RemindrError::config("email.smtp_host is empty"));
        }
        if config.from_address.is_empty() {
            return Err(RemindrError::config("email.from_address is empty"));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| RemindrError::Channel(format!("SMTP relay: {e}")))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            config,
        })
    }

    fn from_mailbox(&self) -> Result<Mailbox> {
        let from_name = self.config.display_name.as_deref().unwrap_or("Remindr");
        format!("{from_name} <{}>", self.config.from_address)
            .parse()
            .map_err(|e| RemindrError::Channel(format!("Invalid from: {e}")))
    }

    /// Build the MIME message without sending it.
    pub fn build_message(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<LettreMessage> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| RemindrError::Channel(format!("Invalid to: {e}")))?;

        LettreMessage::builder()
            .from(self.from_mailbox()?)
            .to(to_mailbox)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_body.to_string(),
                html_body.to_string(),
            ))
            .map_err(|e| RemindrError::Channel(format!("Build email: {e}")))
    }
}

#[async_trait]
impl NotifyChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, destination: &str, subject: &str, text_body: &str, html_body: &str) -> Result<bool> {
        let email = self.build_message(destination, subject, text_body, html_body)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| RemindrError::Delivery(format!("SMTP send: {e}")))?;

        if response.is_positive() {
            tracing::debug!("📤 Email accepted for: {destination}");
            Ok(true)
        } else {
            tracing::warn!("⚠️ SMTP rejected mail for {destination}: {:?}", response.code());
            Ok(false)
        }
    }

    async fn verify(&self) -> Result<bool> {
        let ok = self
            .mailer
            .test_connection()
            .await
            .map_err(|e| RemindrError::ChannelNotReady(format!("SMTP: {e}")))?;
        if ok {
            tracing::info!("📧 SMTP ready: {}:{}", self.config.smtp_host, self.config.smtp_port);
        }
        Ok(ok)
    }
}

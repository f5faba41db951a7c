//! Generic HTTP webhook channel — POST with a JSON body.

use async_trait::async_trait;
use remindr_core::config::WebhookChannelConfig;
use remindr_core::error::{RemindrError, Result};
use remindr_core::traits::NotifyChannel;

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

pub struct WebhookChannel {
    url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookChannelConfig) -> Self {
        Self {
            url: config.url.clone(),
            headers: config.headers.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// JSON payload posted for each reminder.
    pub fn payload(destination: &str, subject: &str, text_body: &str, html_body: &str) -> serde_json::Value {
        serde_json::json!({
            "destination": destination,
            "subject": subject,
            "text": text_body,
            "html": html_body,
            "sent_at": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, destination: &str, subject: &str, text_body: &str, html_body: &str) -> Result<bool> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&Self::payload(destination, subject, text_body, html_body))
            .timeout(std::time::Duration::from_secs(WEBHOOK_TIMEOUT_SECS));

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RemindrError::Delivery(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("✅ Webhook accepted reminder for {destination}");
            Ok(true)
        } else {
            tracing::warn!("⚠️ Webhook error {} for {destination}", resp.status());
            Ok(false)
        }
    }

    async fn verify(&self) -> Result<bool> {
        if self.url.is_empty() {
            return Ok(false);
        }
        reqwest::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .map_err(|e| RemindrError::ChannelNotReady(format!("Webhook url: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(url: &str) -> WebhookChannel {
        WebhookChannel::new(&WebhookChannelConfig {
            enabled: true,
            url: url.into(),
            headers: vec![("X-Token".into(), "abc".into())],
        })
    }

    #[tokio::test]
    async fn test_verify_url() {
        assert!(channel("https://hooks.example.com/remind").verify().await.unwrap());
        assert!(!channel("").verify().await.unwrap());
        assert!(!channel("ftp://example.com").verify().await.unwrap());
        assert!(channel("not a url").verify().await.is_err());
    }

    #[test]
    fn test_payload_fields() {
        let body = WebhookChannel::payload("a@example.com", "Subj", "text", "<b>html</b>");
        assert_eq!(body["destination"], "a@example.com");
        assert_eq!(body["subject"], "Subj");
        assert_eq!(body["html"], "<b>html</b>");
        assert!(body["sent_at"].is_string());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_delivery_error() {
        let err = channel("http://127.0.0.1:1/hook")
            .send("a@example.com", "s", "t", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, RemindrError::Delivery(_)));
    }
}

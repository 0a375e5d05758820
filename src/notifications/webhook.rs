use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{AuditNotification, NotificationSink};

/// POSTs every notification as JSON to a fixed URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn emit(&self, notification: &AuditNotification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .with_context(|| format!("sending {} to {}", notification.event_type.as_str(), self.url))?
            .error_for_status()
            .context("webhook returned error status")?;

        Ok(())
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{check_response, DeliveryError, NotificationChannel};

/// Generic JSON webhook channel (`json://` and `jsons://`).
pub struct WebhookChannel {
    url: Url,
    client: Client,
}

impl WebhookChannel {
    pub fn new(client: Client, url: Url) -> Self {
        Self { url, client }
    }

    fn build_payload(title: &str, body: &str) -> serde_json::Value {
        json!({
            "version": "1.0",
            "title": title,
            "message": body,
            "type": "info",
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "json"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&Self::build_payload(title, body))
            .send()
            .await?;

        check_response(self.channel_type(), response).await?;
        debug!("Webhook notification sent to {}", self.url.host_str().unwrap_or(""));
        Ok(())
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{check_response, DeliveryError, NotificationChannel};

/// ntfy channel. Publishes as JSON to the server root so titles need not
/// be valid header values.
pub struct NtfyChannel {
    server: Url,
    topic: String,
    client: Client,
}

impl NtfyChannel {
    pub fn new(client: Client, server: Url, topic: String) -> Self {
        Self {
            server,
            topic,
            client,
        }
    }

    fn build_payload(&self, title: &str, body: &str) -> serde_json::Value {
        json!({
            "topic": self.topic,
            "title": title,
            "message": body,
        })
    }
}

#[async_trait]
impl NotificationChannel for NtfyChannel {
    fn channel_type(&self) -> &'static str {
        "ntfy"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.server.clone())
            .json(&self.build_payload(title, body))
            .send()
            .await?;

        check_response(self.channel_type(), response).await?;
        debug!("ntfy notification sent to topic {}", self.topic);
        Ok(())
    }
}

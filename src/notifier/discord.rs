use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::{check_response, truncate, DeliveryError, NotificationChannel};

const DISCORD_API: &str = "https://discord.com/api/webhooks";

/// Embed limits imposed by Discord.
const MAX_TITLE_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Discord webhook channel.
pub struct DiscordChannel {
    webhook_url: String,
    client: Client,
}

impl DiscordChannel {
    pub fn new(client: Client, webhook_id: &str, token: &str) -> Self {
        Self {
            webhook_url: format!("{}/{}/{}", DISCORD_API, webhook_id, token),
            client,
        }
    }

    fn build_payload(title: &str, body: &str) -> serde_json::Value {
        json!({
            "username": "reddit-notifier",
            "embeds": [{
                "title": truncate(title, MAX_TITLE_CHARS),
                "description": truncate(body, MAX_DESCRIPTION_CHARS),
                "color": 0xff4500,
            }]
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&Self::build_payload(title, body))
            .send()
            .await?;

        check_response(self.channel_type(), response).await?;
        debug!("Discord notification sent");
        Ok(())
    }
}

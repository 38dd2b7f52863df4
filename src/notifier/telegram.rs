use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::{check_response, truncate, DeliveryError, NotificationChannel};

const TELEGRAM_API: &str = "https://api.telegram.org";

const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram Bot API channel for a single chat. A target listing several
/// chats becomes one channel per chat, so retries never repeat a delivered
/// message.
pub struct TelegramChannel {
    bot_token: String,
    chat_id: String,
    client: Client,
}

impl TelegramChannel {
    pub fn new(client: Client, bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API, self.bot_token)
    }

    fn build_payload(chat_id: &str, title: &str, body: &str) -> serde_json::Value {
        let text = if title.is_empty() {
            body.to_string()
        } else {
            format!("{}\n{}", title, body)
        };
        json!({
            "chat_id": chat_id,
            "text": truncate(&text, MAX_MESSAGE_CHARS),
            "disable_web_page_preview": false,
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&Self::build_payload(&self.chat_id, title, body))
            .send()
            .await?;

        check_response(self.channel_type(), response).await?;
        debug!("Telegram notification sent to chat {}", self.chat_id);
        Ok(())
    }
}

//! Notification delivery.
//!
//! Target URIs from the configuration become [`NotificationChannel`]s:
//! - `discord://ID/TOKEN` - Discord webhooks
//! - `json://` / `jsons://` - generic JSON webhooks
//! - `ntfy://` / `ntfys://` - ntfy topics
//! - `tgram://BOT_TOKEN/CHAT_ID` - Telegram Bot API
//!
//! [`ChannelSet`] fans a notification out to every channel with per-target
//! retries. The supervisor only ever talks to a [`Dispatcher`].

mod discord;
mod ntfy;
mod set;
mod target;
mod telegram;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use thiserror::Error;

pub use discord::DiscordChannel;
pub use ntfy::NtfyChannel;
pub use set::{ChannelSet, RetryPolicy};
pub use target::Target;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("{channel} rejected notification ({status}): {body}")]
    Rejected {
        channel: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{channel} rate limited")]
    RateLimited {
        channel: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{failed} of {total} notification targets failed: {detail}")]
    Failed {
        failed: usize,
        total: usize,
        detail: String,
    },
}

/// Drops the request URL, which may embed webhook or bot tokens.
impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl DeliveryError {
    /// Whether another attempt at the same target may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Rejected { status, .. } => status.is_server_error(),
            Self::Failed { .. } => false,
        }
    }
}

/// A single delivery target.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> &'static str;

    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError>;
}

/// The delivery sink: accepts a title and body for all configured targets.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Forwards rendered notifications to the sink.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn Notifier>) -> Self {
        Self { sink }
    }

    pub async fn dispatch(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        self.sink.notify(title, body).await
    }
}

/// Map a channel's HTTP response to success, rate limiting or rejection.
pub(crate) async fn check_response(
    channel: &'static str,
    response: Response,
) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(DeliveryError::RateLimited {
            channel,
            retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
        channel,
        status,
        body,
    })
}

/// `Retry-After` in (possibly fractional) seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use tracing::{debug, warn};

use super::{
    DeliveryError, DiscordChannel, NotificationChannel, Notifier, NtfyChannel, Target,
    TelegramChannel, WebhookChannel,
};
use crate::app::{NotifierError, Result};

/// Per-target retry behaviour.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per target, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// All configured targets; sends to each of them concurrently.
pub struct ChannelSet {
    channels: Vec<Box<dyn NotificationChannel>>,
    retry: RetryPolicy,
}

impl ChannelSet {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels,
            retry: RetryPolicy::default(),
        }
    }

    /// Build channels from target URIs. Any unparseable URI is an error.
    pub fn from_targets(targets: &[String]) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(DeliveryError::from)?;

        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::with_capacity(targets.len());
        for uri in targets {
            let target: Target = uri
                .parse()
                .map_err(|reason: String| NotifierError::invalid_target(redact(uri), reason))?;
            debug!("Adding {} notification target {}", target.scheme(), target);

            match target {
                Target::Discord { webhook_id, token } => {
                    channels.push(Box::new(DiscordChannel::new(client.clone(), &webhook_id, &token)))
                }
                Target::Json { url } => {
                    channels.push(Box::new(WebhookChannel::new(client.clone(), url)))
                }
                Target::Ntfy { server, topic } => {
                    channels.push(Box::new(NtfyChannel::new(client.clone(), server, topic)))
                }
                Target::Telegram {
                    bot_token,
                    chat_ids,
                } => {
                    for chat_id in chat_ids {
                        channels.push(Box::new(TelegramChannel::new(
                            client.clone(),
                            bot_token.clone(),
                            chat_id,
                        )));
                    }
                }
            }
        }

        Ok(Self::new(channels))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    async fn send_with_retry(
        &self,
        channel: &dyn NotificationChannel,
        title: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError> {
        let mut attempt = 0;
        loop {
            match channel.send(title, body).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = match &e {
                        DeliveryError::RateLimited {
                            retry_after: Some(after),
                            ..
                        } => (*after).min(self.retry.max_delay),
                        _ => self.retry.delay_for_attempt(attempt),
                    };
                    warn!(
                        "{} delivery failed (attempt {}/{}): {}; retrying in {:?}",
                        channel.channel_type(),
                        attempt + 1,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Notifier for ChannelSet {
    async fn notify(&self, title: &str, body: &str) -> std::result::Result<(), DeliveryError> {
        let results = join_all(
            self.channels
                .iter()
                .map(|channel| self.send_with_retry(channel.as_ref(), title, body)),
        )
        .await;

        let errors: Vec<String> = self
            .channels
            .iter()
            .zip(results)
            .filter_map(|(channel, result)| {
                result
                    .err()
                    .map(|e| format!("{}: {}", channel.channel_type(), e))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DeliveryError::Failed {
                failed: errors.len(),
                total: self.channels.len(),
                detail: errors.join("; "),
            })
        }
    }
}

/// Keep only the scheme of a target URI, which may embed secrets.
fn redact(uri: &str) -> String {
    match uri.split_once("://") {
        Some((scheme, _)) => format!("{}://***", scheme),
        None => "***".to_string(),
    }
}

use thiserror::Error;

use crate::config::ConfigError;
use crate::notifier::DeliveryError;
use crate::reddit::FeedError;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid subreddit: {0}")]
    InvalidSource(String),

    #[error("Invalid notification target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Reddit API error: {0}")]
    Feed(#[from] FeedError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifierError {
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifierError>;

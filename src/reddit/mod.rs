//! Reddit feed session.
//!
//! - [`FeedSession`]: async trait the supervisor pulls posts through
//! - [`RedditClient`]: application-only OAuth client over reqwest
//! - [`stream`]: polling stream that yields only posts newer than the
//!   subscription

pub mod client;
pub mod stream;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::domain::Post;

pub use client::RedditClient;

/// Unbounded sequence of posts. Ends only if the underlying session gives up.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<Post, FeedError>> + Send>>;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("subreddit not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by Reddit")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("feed stream ended")]
    Closed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FeedError {
    /// Transient faults pause and resume the stream; anything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }
}

#[async_trait]
pub trait FeedSession: Send + Sync {
    /// Check that a subreddit exists. Fails with [`FeedError::NotFound`] if
    /// it does not.
    async fn validate_source(&self, name: &str) -> Result<(), FeedError>;

    /// Subscribe to new submissions of a `+`-joined multireddit key.
    ///
    /// With `skip_existing`, posts already listed when the subscription
    /// starts are never yielded.
    async fn subscribe(&self, key: &str, skip_existing: bool) -> Result<FeedStream, FeedError>;
}

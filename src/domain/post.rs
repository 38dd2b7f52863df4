use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const REDDIT_BASE_URL: &str = "https://www.reddit.com";

/// A newly submitted post as delivered by the feed. Never mutated after
/// normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Reddit fullname, e.g. `t3_abc123`.
    pub id: String,
    pub title: String,
    /// Link flair text; `None` when the post carries no flair.
    pub flair: Option<String>,
    /// Subreddit display name, as reported by Reddit.
    pub subreddit: String,
    pub created_at: DateTime<Utc>,
    /// Site-relative permalink, e.g. `/r/rust/comments/abc123/title/`.
    pub permalink: String,
}

impl Post {
    pub fn new(id: impl Into<String>, subreddit: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        let subreddit = subreddit.into();
        let permalink = format!("/r/{}/comments/{}/", subreddit, id.trim_start_matches("t3_"));
        Self {
            id,
            title: title.into(),
            flair: None,
            subreddit,
            created_at: Utc::now(),
            permalink,
        }
    }

    pub fn with_flair(mut self, flair: impl Into<String>) -> Self {
        self.flair = Some(flair.into());
        self
    }

    /// Absolute URL of the post.
    pub fn url(&self) -> String {
        if self.permalink.starts_with("http://") || self.permalink.starts_with("https://") {
            self.permalink.clone()
        } else {
            format!("{}{}", REDDIT_BASE_URL, self.permalink)
        }
    }

    pub fn display_flair(&self) -> &str {
        self.flair.as_deref().unwrap_or("")
    }
}

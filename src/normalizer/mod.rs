use chrono::{DateTime, TimeZone, Utc};
use html_escape::decode_html_entities;
use serde::Deserialize;

use crate::domain::Post;
use crate::reddit::FeedError;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: Submission,
}

#[derive(Debug, Deserialize)]
struct Submission {
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    permalink: String,
}

/// Converts Reddit listing JSON into [`Post`]s.
#[derive(Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse a `/new` listing. Posts are returned in listing order (newest
    /// first); non-submission children are dropped.
    pub fn normalize(&self, body: &[u8]) -> Result<Vec<Post>, FeedError> {
        let listing: Listing =
            serde_json::from_slice(body).map_err(|e| FeedError::Decode(e.to_string()))?;

        let posts = listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .map(|thing| {
                let s = thing.data;
                let flair = s
                    .link_flair_text
                    .map(|f| decode_html_entities(&f).into_owned())
                    .filter(|f| !f.trim().is_empty());

                Post {
                    id: s.name,
                    title: decode_html_entities(&s.title).to_string(),
                    flair,
                    subreddit: s.subreddit,
                    created_at: timestamp(s.created_utc),
                    permalink: s.permalink,
                }
            })
            .collect();

        Ok(posts)
    }
}

fn timestamp(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

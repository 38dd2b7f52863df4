use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::Post;
use crate::normalizer::Normalizer;
use crate::reddit::stream::{poll_new, ListingSource, LISTING_LIMIT};
use crate::reddit::{FeedError, FeedSession, FeedStream};

pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const API_BASE_URL: &str = "https://oauth.reddit.com";

/// Tokens are refreshed this long before Reddit says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Application credentials for Reddit's OAuth API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    kind: String,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

struct Inner {
    http: Client,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
    token_url: String,
    api_base: String,
    normalizer: Normalizer,
}

/// Application-only (client credentials) Reddit client.
#[derive(Clone)]
pub struct RedditClient {
    inner: Arc<Inner>,
}

impl RedditClient {
    pub fn new(credentials: Credentials) -> Result<Self, FeedError> {
        Self::with_endpoints(credentials, TOKEN_URL, API_BASE_URL)
    }

    pub fn with_endpoints(
        credentials: Credentials,
        token_url: &str,
        api_base: &str,
    ) -> Result<Self, FeedError> {
        let user_agent = HeaderValue::from_str(&credentials.user_agent)
            .map_err(|e| FeedError::InvalidRequest(format!("user agent: {}", e)))?;

        // Reddit answers unknown subreddits with a redirect to search, which
        // has to stay visible to `validate_source`.
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                credentials,
                token: Mutex::new(None),
                token_url: token_url.to_string(),
                api_base: api_base.trim_end_matches('/').to_string(),
                normalizer: Normalizer::new(),
            }),
        })
    }

    /// Return a cached bearer token, fetching a new one when missing or stale.
    async fn access_token(&self) -> Result<String, FeedError> {
        let mut guard = self.inner.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let creds = &self.inner.credentials;
        let response = self
            .inner
            .http
            .post(&self.inner.token_url)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        token_status(response.status(), &self.inner.token_url)?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(FeedError::Auth(error));
        }
        let value = body
            .access_token
            .ok_or_else(|| FeedError::Decode("token response without access_token".into()))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!("Obtained Reddit access token (valid for {}s)", lifetime.as_secs());

        *guard = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    async fn api_get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, FeedError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.inner.api_base, path);

        let response = self
            .inner
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        if let Some(fault) = api_fault(response.status(), &url) {
            if matches!(fault, FeedError::Auth(_)) {
                // Force a fresh token on the next request
                *self.inner.token.lock().await = None;
            }
            return Err(fault);
        }
        Ok(response)
    }

    /// Fetch the newest submissions of a multireddit key, newest first.
    pub async fn new_posts(&self, key: &str, limit: u32) -> Result<Vec<Post>, FeedError> {
        let path = format!("/r/{}/new", key);
        let response = self
            .api_get(&path, &[("limit", limit.to_string())])
            .await?;

        listing_status(response.status(), key, &path)?;

        let body = response.bytes().await?;
        self.inner.normalizer.normalize(&body)
    }
}

#[async_trait]
impl ListingSource for RedditClient {
    async fn fetch_new(&self, key: &str) -> Result<Vec<Post>, FeedError> {
        self.new_posts(key, LISTING_LIMIT).await
    }
}

#[async_trait]
impl FeedSession for RedditClient {
    async fn validate_source(&self, name: &str) -> Result<(), FeedError> {
        let path = format!("/r/{}/about", name);
        let response = self.api_get(&path, &[]).await?;

        if !about_status(response.status(), name, &path)? {
            return Ok(());
        }

        let about: AboutResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        about_kind(&about.kind, name)
    }

    async fn subscribe(&self, key: &str, skip_existing: bool) -> Result<FeedStream, FeedError> {
        // Authenticate up front so credential problems surface before streaming
        self.access_token().await?;
        Ok(poll_new(self.clone(), key.to_string(), skip_existing))
    }
}

fn token_status(status: StatusCode, url: &str) -> Result<(), FeedError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FeedError::Auth(format!(
            "token request rejected ({})",
            status
        ))),
        StatusCode::TOO_MANY_REQUESTS => Err(FeedError::RateLimited),
        s if !s.is_success() => Err(FeedError::Status {
            status: s,
            url: url.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Faults any authenticated API call can hit.
fn api_fault(status: StatusCode, url: &str) -> Option<FeedError> {
    match status {
        StatusCode::UNAUTHORIZED => Some(FeedError::Auth(format!("token rejected by {}", url))),
        StatusCode::TOO_MANY_REQUESTS => Some(FeedError::RateLimited),
        _ => None,
    }
}

fn listing_status(status: StatusCode, key: &str, path: &str) -> Result<(), FeedError> {
    if status.is_redirection() || status == StatusCode::NOT_FOUND {
        return Err(FeedError::NotFound(key.to_string()));
    }
    if !status.is_success() {
        return Err(FeedError::Status {
            status,
            url: path.to_string(),
        });
    }
    Ok(())
}

/// Interpret an `/about` status. `Ok(true)` means the body still has to be
/// checked.
///
/// Only a redirect to search means the subreddit does not exist. Banned
/// subreddits answer 404 and private or quarantined ones 403; neither is
/// treated as missing.
fn about_status(status: StatusCode, name: &str, path: &str) -> Result<bool, FeedError> {
    if status.is_redirection() {
        return Err(FeedError::NotFound(name.to_string()));
    }
    if status == StatusCode::FORBIDDEN {
        return Ok(false);
    }
    if !status.is_success() {
        return Err(FeedError::Status {
            status,
            url: path.to_string(),
        });
    }
    Ok(true)
}

fn about_kind(kind: &str, name: &str) -> Result<(), FeedError> {
    if kind == "t5" {
        Ok(())
    } else {
        Err(FeedError::NotFound(name.to_string()))
    }
}

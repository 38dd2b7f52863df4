//! Turns repeated listing polls into a stream of new posts.
//!
//! Each poll fetches the newest submissions, drops any already seen, and
//! queues the rest oldest-first. Polls that find nothing back off
//! exponentially; a poll that finds something resets the delay.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use crate::dedup::SeenCache;
use crate::domain::Post;
use crate::reddit::{FeedError, FeedStream};

/// Posts requested per listing poll.
pub const LISTING_LIMIT: u32 = 100;

/// Enough to cover three full listings.
pub const SEEN_CAPACITY: usize = 301;

pub const MAX_POLL_DELAY: Duration = Duration::from_secs(16);

/// Source of "newest first" listings.
#[async_trait]
pub trait ListingSource: Send + Sync + 'static {
    async fn fetch_new(&self, key: &str) -> Result<Vec<Post>, FeedError>;
}

/// Delay that doubles from one second up to a ceiling.
#[derive(Debug, Clone)]
pub struct ExponentialCounter {
    current: Duration,
    max: Duration,
}

impl ExponentialCounter {
    pub fn new(max: Duration) -> Self {
        Self {
            current: Duration::from_secs(1),
            max,
        }
    }

    /// Current delay; the following call returns double (capped).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = Duration::from_secs(1);
    }
}

struct PollState<S> {
    source: S,
    key: String,
    seen: SeenCache,
    queue: VecDeque<Post>,
    skip_batch: bool,
    counter: ExponentialCounter,
    wait: Option<Duration>,
    failed: bool,
}

impl<S: ListingSource> PollState<S> {
    /// Queue the unseen posts of one listing. Returns whether any were new.
    fn absorb(&mut self, posts: Vec<Post>) -> bool {
        let mut found = false;
        for post in posts.into_iter().rev() {
            if !self.seen.insert(post.id.clone()) {
                continue;
            }
            found = true;
            if !self.skip_batch {
                self.queue.push_back(post);
            }
        }
        self.skip_batch = false;
        found
    }
}

/// Stream posts submitted to `key`.
///
/// With `skip_existing`, the first listing only primes the seen-set. After
/// yielding an error the stream ends; callers resubscribe.
pub fn poll_new<S: ListingSource>(source: S, key: String, skip_existing: bool) -> FeedStream {
    let state = PollState {
        source,
        key,
        seen: SeenCache::new(SEEN_CAPACITY),
        queue: VecDeque::new(),
        skip_batch: skip_existing,
        counter: ExponentialCounter::new(MAX_POLL_DELAY),
        wait: None,
        failed: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }

        loop {
            if let Some(post) = state.queue.pop_front() {
                return Some((Ok(post), state));
            }

            if let Some(wait) = state.wait.take() {
                tokio::time::sleep(wait).await;
            }

            match state.source.fetch_new(&state.key).await {
                Ok(posts) => {
                    if state.absorb(posts) {
                        state.counter.reset();
                    } else {
                        state.wait = Some(state.counter.next_delay());
                    }
                }
                Err(e) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
            }
        }
    }))
}

//! Stream supervisor.
//!
//! Owns the subscription to the feed and every piece of mutable state the
//! pipeline needs (the seen cache, the bindings, the dispatcher). Posts are
//! handled one at a time in arrival order.
//!
//! ```text
//! Connecting ──▶ Streaming ──(recoverable fault)──▶ Backoff ──▶ Connecting
//!                    │
//!                    └──(cancelled)──▶ Terminating ──▶ Terminated
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::{NotifierError, Result};
use crate::dedup::{SeenCache, DEFAULT_CAPACITY};
use crate::domain::{source_key, Post, SourceBinding};
use crate::notifier::Dispatcher;
use crate::reddit::{FeedError, FeedSession};
use crate::template::NotificationTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Streaming,
    Backoff,
    Terminating,
    Terminated,
}

/// How many notifications a post matching several bindings produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// One notification per post id.
    #[default]
    OncePerItem,
    /// One notification per matching binding.
    PerRuleSet,
}

/// Timed suspension used for the backoff pause.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub backoff: Duration,
    pub policy: NotifyPolicy,
    pub cache_size: usize,
    /// Echo every matched post to the log.
    pub verbose: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(30),
            policy: NotifyPolicy::default(),
            cache_size: DEFAULT_CAPACITY,
            verbose: false,
        }
    }
}

pub struct Supervisor {
    session: Arc<dyn FeedSession>,
    bindings: Vec<SourceBinding>,
    template: NotificationTemplate,
    dispatcher: Dispatcher,
    cache: SeenCache,
    options: SupervisorOptions,
    timer: Arc<dyn Timer>,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(
        session: Arc<dyn FeedSession>,
        bindings: Vec<SourceBinding>,
        template: NotificationTemplate,
        dispatcher: Dispatcher,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            session,
            bindings,
            template,
            dispatcher,
            cache: SeenCache::new(options.cache_size),
            options,
            timer: Arc::new(TokioTimer),
            state: SupervisorState::Connecting,
        }
    }

    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn cache(&self) -> &SeenCache {
        &self.cache
    }

    pub fn bindings(&self) -> &[SourceBinding] {
        &self.bindings
    }

    /// Check every configured subreddit once before streaming.
    ///
    /// A subreddit that does not exist is fatal. A transient fault during the
    /// check is logged and ignored.
    pub async fn validate_sources(&self) -> Result<()> {
        let mut checked: Vec<String> = Vec::new();

        for binding in &self.bindings {
            let name = binding.name.to_lowercase();
            if checked.contains(&name) {
                continue;
            }
            checked.push(name);

            match self.session.validate_source(&binding.name).await {
                Ok(()) => debug!("r/{} exists", binding.name),
                Err(FeedError::NotFound(_)) => {
                    return Err(NotifierError::InvalidSource(binding.name.clone()));
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Could not validate r/{}: {}", binding.name, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Stream until cancelled. Returns an error only for faults that are not
    /// recoverable.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let key = source_key(&self.bindings);
        for binding in &self.bindings {
            info!("r/{}: {}", binding.name, binding.rules);
        }

        while !cancel.is_cancelled() {
            self.state = SupervisorState::Connecting;

            let fault = match self.stream(&key, &cancel).await {
                Some(fault) => fault,
                None => break,
            };

            if !fault.is_recoverable() {
                error!("Unrecoverable Reddit API error: {}", fault);
                self.state = SupervisorState::Terminated;
                return Err(fault.into());
            }

            error!("Reddit API error: {}", fault);
            self.state = SupervisorState::Backoff;
            info!("Pausing for {} seconds...", self.options.backoff.as_secs());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.timer.sleep(self.options.backoff) => {}
            }
        }

        self.state = SupervisorState::Terminating;
        info!("Stopping application, bye bye");
        self.state = SupervisorState::Terminated;
        Ok(())
    }

    /// Subscribe and process posts until a fault occurs. `None` means the
    /// token was cancelled.
    async fn stream(&mut self, key: &str, cancel: &CancellationToken) -> Option<FeedError> {
        let subscription = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = self.session.subscribe(key, true) => result,
        };

        let mut posts = match subscription {
            Ok(posts) => posts,
            Err(e) => return Some(e),
        };

        self.state = SupervisorState::Streaming;
        debug!("Subscribed to r/{}", key);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                next = posts.next() => next,
            };

            match next {
                Some(Ok(post)) => {
                    self.process_post(&post).await;
                }
                Some(Err(e)) => return Some(e),
                None => return Some(FeedError::Closed),
            }
        }
    }

    /// Route one post through the bindings for its subreddit. Returns the
    /// number of notifications dispatched.
    pub async fn process_post(&mut self, post: &Post) -> usize {
        let bound: Vec<&SourceBinding> = self
            .bindings
            .iter()
            .filter(|b| b.is_bound_to(&post.subreddit))
            .collect();

        if bound.is_empty() {
            debug!("Skipping {}: r/{} is not configured", post.id, post.subreddit);
            return 0;
        }

        if self.cache.contains(&post.id) {
            debug!("Skipping {}: already notified", post.id);
            return 0;
        }

        let matching = bound
            .iter()
            .filter(|b| b.rules.matches(&post.title, post.flair.as_deref()))
            .count();

        let notifications = match self.options.policy {
            NotifyPolicy::OncePerItem => matching.min(1),
            NotifyPolicy::PerRuleSet => matching,
        };

        if notifications == 0 {
            return 0;
        }

        self.cache.insert(post.id.clone());

        let (title, body) = self.template.render(post);
        for _ in 0..notifications {
            if let Err(e) = self.dispatcher.dispatch(&title, &body).await {
                warn!("Failed to deliver notification for {}: {}", post.id, e);
            }
        }

        if self.options.verbose {
            info!(
                created = %post.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                source = %post.subreddit,
                title = %post.title,
                label = %post.display_flair(),
                permalink = %post.permalink,
                "Matched post"
            );
        }

        notifications
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::stream;
    use tokio_test::assert_ok;

    use super::*;
    use crate::domain::RuleSet;
    use crate::notifier::{DeliveryError, Notifier};
    use crate::reddit::FeedStream;

    /// Hands out scripted subscriptions in order. Each stream yields its
    /// items and then stays open unless `close_streams` is set.
    #[derive(Default)]
    struct FakeSession {
        scripts: Mutex<VecDeque<std::result::Result<Vec<std::result::Result<Post, FeedError>>, FeedError>>>,
        subscriptions: Mutex<Vec<(String, bool)>>,
        close_streams: bool,
        missing: Vec<String>,
        unreachable: bool,
        validated: Mutex<Vec<String>>,
    }

    impl FakeSession {
        fn with_scripts(
            scripts: Vec<std::result::Result<Vec<std::result::Result<Post, FeedError>>, FeedError>>,
        ) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                ..Default::default()
            }
        }

        fn subscriptions(&self) -> Vec<(String, bool)> {
            self.subscriptions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSession for FakeSession {
        async fn validate_source(&self, name: &str) -> std::result::Result<(), FeedError> {
            self.validated.lock().unwrap().push(name.to_string());
            if self.missing.iter().any(|m| m == name) {
                return Err(FeedError::NotFound(name.to_string()));
            }
            if self.unreachable {
                return Err(FeedError::RateLimited);
            }
            Ok(())
        }

        async fn subscribe(
            &self,
            key: &str,
            skip_existing: bool,
        ) -> std::result::Result<FeedStream, FeedError> {
            self.subscriptions
                .lock()
                .unwrap()
                .push((key.to_string(), skip_existing));

            let script = self.scripts.lock().unwrap().pop_front();
            let items = match script {
                Some(script) => script?,
                None => Vec::new(),
            };

            if self.close_streams {
                Ok(Box::pin(stream::iter(items)))
            } else {
                Ok(Box::pin(stream::iter(items).chain(stream::pending())))
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingSink {
        async fn notify(&self, title: &str, body: &str) -> std::result::Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            if self.fail {
                return Err(DeliveryError::Failed {
                    failed: 1,
                    total: 1,
                    detail: "sink down".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTimer {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Timer for RecordingTimer {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn sale_rules() -> RuleSet {
        RuleSet {
            title: vec!["sale".into()],
            ..Default::default()
        }
    }

    fn supervisor(
        session: Arc<FakeSession>,
        sink: Arc<RecordingSink>,
        bindings: Vec<SourceBinding>,
        options: SupervisorOptions,
    ) -> Supervisor {
        Supervisor::new(
            session,
            bindings,
            NotificationTemplate::default(),
            Dispatcher::new(sink),
            options,
        )
    }

    /// Token cancelled after `secs` of (paused) tokio time.
    fn cancel_after(secs: u64) -> CancellationToken {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            trigger.cancel();
        });
        token
    }

    #[tokio::test]
    async fn test_same_post_notifies_once() {
        let sink = Arc::new(RecordingSink::default());
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        );
        let post = Post::new("t3_a", "deals", "Big SALE today");

        assert_eq!(sup.process_post(&post).await, 1);
        assert_eq!(sup.process_post(&post).await, 0);

        assert_eq!(
            sink.sent(),
            vec![(
                "deals - Big SALE today".to_string(),
                "https://www.reddit.com/r/deals/comments/a/".to_string()
            )]
        );
        assert!(sup.cache().contains("t3_a"));
    }

    #[tokio::test]
    async fn test_multiple_matching_bindings_notify_once() {
        let sink = Arc::new(RecordingSink::default());
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![
                SourceBinding::new("deals", sale_rules()),
                SourceBinding::new("Deals", RuleSet::default()),
            ],
            SupervisorOptions::default(),
        );

        let post = Post::new("t3_b", "DEALS", "Flash sale");
        assert_eq!(sup.process_post(&post).await, 1);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_per_rule_set_policy_notifies_each_match() {
        let sink = Arc::new(RecordingSink::default());
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![
                SourceBinding::new("deals", sale_rules()),
                SourceBinding::new("deals", RuleSet::default()),
                SourceBinding::new(
                    "deals",
                    RuleSet {
                        not_title: vec!["flash".into()],
                        ..Default::default()
                    },
                ),
            ],
            SupervisorOptions {
                policy: NotifyPolicy::PerRuleSet,
                ..Default::default()
            },
        );

        let post = Post::new("t3_c", "deals", "Flash sale");
        assert_eq!(sup.process_post(&post).await, 2);
        assert_eq!(sup.process_post(&post).await, 0);
        assert_eq!(sink.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_unbound_source_is_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![SourceBinding::new("deals", RuleSet::default())],
            SupervisorOptions::default(),
        );

        let post = Post::new("t3_d", "other", "sale");
        assert_eq!(sup.process_post(&post).await, 0);
        assert!(sink.sent().is_empty());
        assert!(sup.cache().is_empty());
    }

    #[tokio::test]
    async fn test_non_matching_post_is_not_cached() {
        let sink = Arc::new(RecordingSink::default());
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        );

        let post = Post::new("t3_e", "deals", "Question about GPUs");
        assert_eq!(sup.process_post(&post).await, 0);
        assert!(!sup.cache().contains("t3_e"));
    }

    #[tokio::test]
    async fn test_delivery_failure_still_marks_seen() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        );

        let post = Post::new("t3_f", "deals", "sale");
        assert_eq!(sup.process_post(&post).await, 1);
        assert!(sup.cache().contains("t3_f"));

        assert_eq!(sup.process_post(&post).await, 0);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_capacity_from_options() {
        let sink = Arc::new(RecordingSink::default());
        let mut sup = supervisor(
            Arc::new(FakeSession::default()),
            sink.clone(),
            vec![SourceBinding::new("deals", RuleSet::default())],
            SupervisorOptions {
                cache_size: 2,
                ..Default::default()
            },
        );

        for id in ["t3_1", "t3_2", "t3_3"] {
            sup.process_post(&Post::new(id, "deals", "x")).await;
        }
        assert_eq!(sup.cache().len(), 2);
        assert!(!sup.cache().contains("t3_1"));

        // Evicted ids may notify again.
        assert_eq!(sup.process_post(&Post::new("t3_1", "deals", "x")).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_fault_pauses_once_and_resubscribes() {
        let session = Arc::new(FakeSession::with_scripts(vec![
            Ok(vec![
                Ok(Post::new("t3_1", "deals", "sale one")),
                Err(FeedError::RateLimited),
            ]),
            Ok(vec![Ok(Post::new("t3_2", "deals", "sale two"))]),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let timer = Arc::new(RecordingTimer::default());
        let mut sup = supervisor(
            session.clone(),
            sink.clone(),
            vec![
                SourceBinding::new("deals", sale_rules()),
                SourceBinding::new("bapcs", sale_rules()),
            ],
            SupervisorOptions::default(),
        )
        .with_timer(timer.clone());

        sup.run(cancel_after(60)).await.unwrap();

        assert_eq!(
            *timer.sleeps.lock().unwrap(),
            vec![Duration::from_secs(30)]
        );
        assert_eq!(
            session.subscriptions(),
            vec![
                ("deals+bapcs".to_string(), true),
                ("deals+bapcs".to_string(), true)
            ]
        );
        assert_eq!(sink.sent().len(), 2);
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_subscribe_backs_off() {
        let session = Arc::new(FakeSession::with_scripts(vec![
            Err(FeedError::Auth("invalid_grant".into())),
            Ok(vec![Ok(Post::new("t3_1", "deals", "sale"))]),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let timer = Arc::new(RecordingTimer::default());
        let mut sup = supervisor(
            session.clone(),
            sink.clone(),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        )
        .with_timer(timer.clone());

        sup.run(cancel_after(60)).await.unwrap();

        assert_eq!(timer.sleeps.lock().unwrap().len(), 1);
        assert_eq!(session.subscriptions().len(), 2);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_is_recoverable() {
        let session = Arc::new(FakeSession {
            close_streams: true,
            ..Default::default()
        });
        let mut sup = supervisor(
            session.clone(),
            Arc::new(RecordingSink::default()),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions {
                backoff: Duration::from_secs(5),
                ..Default::default()
            },
        );

        // Subscriptions at 0s, 5s and 10s; cancelled during the third pause.
        sup.run(cancel_after(12)).await.unwrap();

        assert_eq!(session.subscriptions().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let session = Arc::new(FakeSession::with_scripts(vec![Ok(vec![Err(
            FeedError::RateLimited,
        )])]));
        let mut sup = supervisor(
            session.clone(),
            Arc::new(RecordingSink::default()),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        );

        let start = tokio::time::Instant::now();
        sup.run(cancel_after(10)).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        assert_eq!(session.subscriptions().len(), 1);
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let session = Arc::new(FakeSession::default());
        let mut sup = supervisor(
            session.clone(),
            Arc::new(RecordingSink::default()),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        );

        let token = CancellationToken::new();
        token.cancel();
        sup.run(token).await.unwrap();

        assert!(session.subscriptions().is_empty());
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_unrecoverable_fault_propagates() {
        let session = Arc::new(FakeSession::with_scripts(vec![Ok(vec![Err(
            FeedError::InvalidRequest("bad user agent".into()),
        )])]));
        let timer = Arc::new(RecordingTimer::default());
        let mut sup = supervisor(
            session,
            Arc::new(RecordingSink::default()),
            vec![SourceBinding::new("deals", sale_rules())],
            SupervisorOptions::default(),
        )
        .with_timer(timer.clone());

        let err = sup.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            NotifierError::Feed(FeedError::InvalidRequest(_))
        ));
        assert!(timer.sleeps.lock().unwrap().is_empty());
        assert_eq!(sup.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let session = Arc::new(FakeSession {
            missing: vec!["nosuchsub".into()],
            ..Default::default()
        });
        let sup = supervisor(
            session,
            Arc::new(RecordingSink::default()),
            vec![
                SourceBinding::new("deals", sale_rules()),
                SourceBinding::new("nosuchsub", sale_rules()),
            ],
            SupervisorOptions::default(),
        );

        let err = sup.validate_sources().await.unwrap_err();
        assert!(matches!(err, NotifierError::InvalidSource(name) if name == "nosuchsub"));
    }

    #[tokio::test]
    async fn test_validation_fault_is_not_fatal() {
        let session = Arc::new(FakeSession {
            unreachable: true,
            ..Default::default()
        });
        let sup = supervisor(
            session.clone(),
            Arc::new(RecordingSink::default()),
            vec![
                SourceBinding::new("deals", sale_rules()),
                SourceBinding::new("DEALS", RuleSet::default()),
                SourceBinding::new("bapcs", sale_rules()),
            ],
            SupervisorOptions::default(),
        );

        assert_ok!(sup.validate_sources().await);
        assert_eq!(*session.validated.lock().unwrap(), vec!["deals", "bapcs"]);
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: NotifyPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"per_rule_set\"").unwrap();
        assert_eq!(w.policy, NotifyPolicy::PerRuleSet);
    }
}

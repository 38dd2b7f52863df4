//! # Reddit Post Notifier
//!
//! Watches subreddits for new posts and sends a notification for every post
//! that passes its subreddit's title and flair rules.
//!
//! ## Architecture
//!
//! ```text
//! RedditClient → Normalizer → Supervisor → RuleSet → SeenCache → Template → Dispatcher
//! ```
//!
//! - [`reddit`]: OAuth client and polling stream of new submissions
//! - [`normalizer`]: Converts listing JSON into [`Post`](domain::Post)s
//! - [`supervisor`]: Pull loop with backoff, reconnect and cancellation
//! - [`notifier`]: Discord, JSON webhook, ntfy and Telegram delivery
//!
//! ## Quick Start
//!
//! ```bash
//! # Write an example config to ~/.config/reddit-notifier/config.toml
//! reddit-notifier
//!
//! # Check credentials, subreddits and targets
//! reddit-notifier check
//!
//! # Send a test notification
//! reddit-notifier test
//!
//! # Watch, echoing every match
//! reddit-notifier --logging true
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the
/// configuration, the Reddit session and the notification channels.
pub mod app;

/// Command-line interface using clap.
///
/// - `watch` - Stream new posts and notify (default)
/// - `check` - Validate configuration and subreddits
/// - `test` - Send a test notification
pub mod cli;

/// TOML configuration.
///
/// Loads from `~/.config/reddit-notifier/config.toml`.
pub mod config;

/// Bounded, insertion-ordered set of already notified post ids.
pub mod dedup;

/// Core domain models.
///
/// - [`Post`](domain::Post): a new submission
/// - [`RuleSet`](domain::RuleSet): include/exclude title and flair terms
/// - [`SourceBinding`](domain::SourceBinding): a subreddit bound to a rule set
pub mod domain;

/// Reddit listing parsing and normalization.
pub mod normalizer;

/// Notification channels and fan-out.
pub mod notifier;

/// Reddit API session.
///
/// - [`FeedSession`](reddit::FeedSession): Async trait the supervisor streams through
/// - [`RedditClient`](reddit::RedditClient): reqwest-based implementation
pub mod reddit;

/// Stream supervisor state machine.
pub mod supervisor;

/// `{NAME}` placeholder rendering for notification titles and bodies.
pub mod template;

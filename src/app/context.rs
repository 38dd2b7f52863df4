use std::path::Path;
use std::sync::Arc;

use crate::app::error::Result;
use crate::config::{Config, ConfigError};
use crate::notifier::{ChannelSet, Dispatcher};
use crate::reddit::{FeedSession, RedditClient};
use crate::supervisor::{Supervisor, SupervisorOptions};

pub struct AppContext {
    pub config: Config,
    pub session: Arc<dyn FeedSession>,
    pub channels: Arc<ChannelSet>,
    pub dispatcher: Dispatcher,
}

impl AppContext {
    /// Load configuration from `config_path` (or the default location) and
    /// build the Reddit session and notification channels.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let session: Arc<dyn FeedSession> = Arc::new(RedditClient::new(config.credentials())?);
        let channels = ChannelSet::from_targets(&config.notifiers)?;
        if channels.is_empty() {
            return Err(ConfigError::invalid("no notifiers configured").into());
        }
        let channels = Arc::new(channels);
        let dispatcher = Dispatcher::new(channels.clone());

        Ok(Self {
            config,
            session,
            channels,
            dispatcher,
        })
    }

    pub fn supervisor(&self, verbose: bool) -> Supervisor {
        let watcher = &self.config.watcher;
        let options = SupervisorOptions {
            backoff: watcher.backoff(),
            policy: watcher.policy,
            cache_size: watcher.cache_size,
            verbose,
        };

        Supervisor::new(
            self.session.clone(),
            self.config.reddit.subreddits.clone(),
            self.config.template(),
            self.dispatcher.clone(),
            options,
        )
    }
}

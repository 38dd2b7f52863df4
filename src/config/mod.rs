//! Configuration management.
//!
//! Configuration is read from `~/.config/reddit-notifier/config.toml` unless
//! a path is given. If the default file doesn't exist, an example
//! configuration with comments is written there and loading fails so the
//! user can fill in credentials.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dedup::DEFAULT_CAPACITY;
use crate::domain::SourceBinding;
use crate::reddit::client::Credentials;
use crate::supervisor::NotifyPolicy;
use crate::template::{NotificationTemplate, DEFAULT_BODY_TEMPLATE, DEFAULT_TITLE_TEMPLATE};

pub const DEFAULT_BACKOFF_SECS: u64 = 30;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Notification target URIs.
    #[serde(default)]
    pub notifiers: Vec<String>,
    pub reddit: RedditConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditConfig {
    pub client: String,
    pub secret: String,
    pub agent: String,
    #[serde(default = "default_title")]
    pub notification_title: String,
    #[serde(default = "default_body")]
    pub notification_body: String,
    #[serde(default)]
    pub subreddits: Vec<SourceBinding>,
}

fn default_title() -> String {
    DEFAULT_TITLE_TEMPLATE.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY_TEMPLATE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Number of recently notified post ids remembered.
    pub cache_size: usize,
    /// Pause after a Reddit API error before resubscribing.
    pub backoff_secs: u64,
    pub policy: NotifyPolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CAPACITY,
            backoff_secs: DEFAULT_BACKOFF_SECS,
            policy: NotifyPolicy::default(),
        }
    }
}

impl WatcherConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Config {
    /// Load and validate configuration from `path`, or from the default path
    /// when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = Self::default_config_path()?;
                if !default_path.exists() {
                    Self::create_default_config(&default_path)?;
                    return Err(ConfigError::Created { path: default_path });
                }
                default_path
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config = Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the default config file path: `~/.config/reddit-notifier/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("reddit-notifier").join("config.toml"))
    }

    /// Reject configurations the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reddit = &self.reddit;
        for (field, value) in [
            ("reddit.client", &reddit.client),
            ("reddit.secret", &reddit.secret),
            ("reddit.agent", &reddit.agent),
            ("reddit.notification_title", &reddit.notification_title),
            ("reddit.notification_body", &reddit.notification_body),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{} must not be empty", field)));
            }
        }

        if reddit.subreddits.is_empty() {
            return Err(ConfigError::invalid("no subreddits configured"));
        }

        for binding in &reddit.subreddits {
            let valid_name = !binding.name.is_empty()
                && binding
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_name {
                return Err(ConfigError::invalid(format!(
                    "invalid subreddit name '{}'",
                    binding.name
                )));
            }

            if binding.rules.terms().any(|t| t.trim().is_empty()) {
                return Err(ConfigError::invalid(format!(
                    "r/{}: rule terms must not be empty",
                    binding.name
                )));
            }
        }

        if self.notifiers.is_empty() {
            return Err(ConfigError::invalid("no notifiers configured"));
        }

        if self.watcher.cache_size == 0 {
            return Err(ConfigError::invalid("watcher.cache_size must be at least 1"));
        }

        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.reddit.client.clone(),
            client_secret: self.reddit.secret.clone(),
            user_agent: self.reddit.agent.clone(),
        }
    }

    pub fn template(&self) -> NotificationTemplate {
        NotificationTemplate::new(
            self.reddit.notification_title.clone(),
            self.reddit.notification_body.clone(),
        )
    }

    /// Write an example config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Example config file content.
    pub fn default_config_content() -> &'static str {
        r##"# Reddit Post Notifier configuration

# Where to send notifications. Supported:
#   discord://WEBHOOK_ID/WEBHOOK_TOKEN
#   json://host/path          (jsons:// for https)
#   ntfy://host/topic         (ntfys:// for https)
#   tgram://BOT_TOKEN/CHAT_ID
notifiers = ["ntfys://ntfy.sh/change-me"]

[reddit]
# Create a "script" app at https://www.reddit.com/prefs/apps
client = "CLIENT_ID"
secret = "CLIENT_SECRET"
agent = "reddit-notifier/0.1 (by u/your-username)"

# Placeholders: {TITLE} {SUBREDDIT} {SOURCE} {URL} {FLAIR} {LABEL} {ID} {CREATED}
notification_title = "{SOURCE} - {TITLE}"
notification_body = "{URL}"

# One block per rule set. A subreddit may appear more than once.
#   title     - title must contain one of these (case-insensitive)
#   not_title - title must contain none of these
#   flair     - flair must equal one of these (only checked when the post has a flair)
#   not_flair - flair must equal none of these
[[reddit.subreddits]]
name = "buildapcsales"
title = ["gpu", "ssd"]
not_flair = ["expired"]

[watcher]
# Post ids remembered to avoid duplicate notifications
cache_size = 100

# Seconds to wait after a Reddit API error before reconnecting
backoff_secs = 30

# "once_per_item": one notification per post, even if several rule sets match
# "per_rule_set": one notification per matching rule set
policy = "once_per_item"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Wrote an example configuration to {path}; edit it and run again")]
    Created { path: PathBuf },

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
notifiers = ["json://localhost/hook"]

[reddit]
client = "id"
secret = "secret"
agent = "agent"

[[reddit.subreddits]]
name = "rust"
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::parse(Config::default_config_content())
            .expect("Default config should be valid TOML");
        config.validate().expect("Default config should validate");

        assert_eq!(config.reddit.subreddits[0].name, "buildapcsales");
        assert_eq!(config.reddit.subreddits[0].rules.title, vec!["gpu", "ssd"]);
        assert_eq!(config.reddit.subreddits[0].rules.not_flair, vec!["expired"]);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.reddit.notification_title, "{SOURCE} - {TITLE}");
        assert_eq!(config.reddit.notification_body, "{URL}");
        assert_eq!(config.watcher.cache_size, 100);
        assert_eq!(config.watcher.backoff(), Duration::from_secs(30));
        assert_eq!(config.watcher.policy, NotifyPolicy::OncePerItem);
        assert!(config.reddit.subreddits[0].rules.is_unconstrained());
    }

    #[test]
    fn test_repeated_subreddit_bindings() {
        let content = format!(
            "{}\n[[reddit.subreddits]]\nname = \"rust\"\ntitle = [\"async\"]\n",
            MINIMAL
        );
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.reddit.subreddits.len(), 2);
        assert_eq!(config.reddit.subreddits[1].rules.title, vec!["async"]);
    }

    #[test]
    fn test_per_rule_set_policy() {
        let content = format!("{}\n[watcher]\npolicy = \"per_rule_set\"\n", MINIMAL);
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.watcher.policy, NotifyPolicy::PerRuleSet);
    }

    #[test]
    fn test_rejects_empty_credentials() {
        let content = MINIMAL.replace("secret = \"secret\"", "secret = \"\"");
        let err = Config::parse(&content).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("reddit.secret"));
    }

    #[test]
    fn test_rejects_invalid_subreddit_name() {
        let content = MINIMAL.replace("name = \"rust\"", "name = \"rust+golang\"");
        assert!(Config::parse(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_empty_term() {
        let content = format!("{}title = [\"\"]\n", MINIMAL);
        assert!(Config::parse(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_missing_subreddits() {
        let content = r#"
notifiers = ["json://localhost/hook"]
[reddit]
client = "id"
secret = "secret"
agent = "agent"
"#;
        assert!(Config::parse(content).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_missing_notifiers() {
        let content = MINIMAL.replace("notifiers = [\"json://localhost/hook\"]", "");
        assert!(Config::parse(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_zero_cache() {
        let content = format!("{}\n[watcher]\ncache_size = 0\n", MINIMAL);
        assert!(Config::parse(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(Config::parse("[reddit\nclient = ").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.credentials().client_id, "id");
        assert_eq!(config.credentials().user_agent, "agent");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_create_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::create_default_config(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, Config::default_config_content());
    }
}

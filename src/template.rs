//! Placeholder substitution for notification titles and bodies.
//!
//! Templates reference post attributes as `{NAME}`, where `NAME` consists of
//! word characters. Unknown placeholders are left untouched, and braces
//! around anything that is not a word are plain text.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::domain::Post;

pub const DEFAULT_TITLE_TEMPLATE: &str = "{SOURCE} - {TITLE}";
pub const DEFAULT_BODY_TEMPLATE: &str = "{URL}";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"));

/// A value bound to a placeholder, either fixed or computed at render time.
pub enum TemplateValue {
    Text(String),
    Computed(Box<dyn Fn() -> String + Send + Sync>),
}

impl TemplateValue {
    pub fn computed(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Computed(Box::new(f))
    }

    pub fn resolve(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

pub type TemplateContext = HashMap<String, TemplateValue>;

/// Replace every `{NAME}` in `template` whose name is a key of `mapping`.
pub fn render(template: &str, mapping: &TemplateContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match mapping.get(&caps[1]) {
            Some(value) => value.resolve(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder values for a post.
///
/// `SUBREDDIT`/`SOURCE` and `FLAIR`/`LABEL` are aliases of each other.
pub fn post_context(post: &Post) -> TemplateContext {
    let mut mapping = TemplateContext::new();
    mapping.insert("TITLE".into(), post.title.as_str().into());
    mapping.insert("SUBREDDIT".into(), post.subreddit.as_str().into());
    mapping.insert("SOURCE".into(), post.subreddit.as_str().into());
    mapping.insert("URL".into(), post.url().into());
    mapping.insert("FLAIR".into(), post.display_flair().into());
    mapping.insert("LABEL".into(), post.display_flair().into());
    mapping.insert("ID".into(), post.id.as_str().into());

    let created = post.created_at;
    mapping.insert(
        "CREATED".into(),
        TemplateValue::computed(move || {
            created
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        }),
    );
    mapping
}

/// Title and body templates, fixed at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub title: String,
    pub body: String,
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_TEMPLATE.to_string(),
            body: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }
}

impl NotificationTemplate {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Render `(title, body)` for a post.
    pub fn render(&self, post: &Post) -> (String, String) {
        let mapping = post_context(post);
        (render(&self.title, &mapping), render(&self.body, &mapping))
    }
}

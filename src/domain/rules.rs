use std::fmt;

use serde::{Deserialize, Serialize};

/// Include/exclude terms for one subreddit binding.
///
/// An empty list places no constraint. Title terms match as
/// case-insensitive substrings, flair terms as case-insensitive equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub title: Vec<String>,
    pub not_title: Vec<String>,
    pub flair: Vec<String>,
    pub not_flair: Vec<String>,
}

impl RuleSet {
    /// Evaluate a post's title and flair against these rules.
    ///
    /// Flair rules are only consulted when the post has a flair: a post
    /// without one is never rejected by `flair` or `not_flair`.
    pub fn matches(&self, title: &str, flair: Option<&str>) -> bool {
        let title = title.to_lowercase();

        if !self.title.is_empty() && !self.title.iter().any(|t| title.contains(&t.to_lowercase())) {
            return false;
        }

        if self.not_title.iter().any(|t| title.contains(&t.to_lowercase())) {
            return false;
        }

        if let Some(flair) = flair {
            let flair = flair.to_lowercase();

            if !self.flair.is_empty() && !self.flair.iter().any(|f| f.to_lowercase() == flair) {
                return false;
            }

            if self.not_flair.iter().any(|f| f.to_lowercase() == flair) {
                return false;
            }
        }

        true
    }

    pub fn is_unconstrained(&self) -> bool {
        self.title.is_empty()
            && self.not_title.is_empty()
            && self.flair.is_empty()
            && self.not_flair.is_empty()
    }

    /// All terms across the four lists.
    pub fn terms(&self) -> impl Iterator<Item = &String> {
        self.title
            .iter()
            .chain(&self.not_title)
            .chain(&self.flair)
            .chain(&self.not_flair)
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            return write!(f, "all posts");
        }
        let lists = [
            ("title", &self.title),
            ("not_title", &self.not_title),
            ("flair", &self.flair),
            ("not_flair", &self.not_flair),
        ];
        let parts: Vec<String> = lists
            .iter()
            .filter(|(_, terms)| !terms.is_empty())
            .map(|(name, terms)| format!("{}={:?}", name, terms))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// A subreddit name bound to a rule set. The same subreddit may appear in
/// several bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBinding {
    pub name: String,
    #[serde(flatten)]
    pub rules: RuleSet,
}

impl SourceBinding {
    pub fn new(name: impl Into<String>, rules: RuleSet) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Case-insensitive comparison with a subreddit name from the feed.
    pub fn is_bound_to(&self, subreddit: &str) -> bool {
        self.name.to_lowercase() == subreddit.to_lowercase()
    }
}

/// Join distinct subreddit names into a multireddit key (`a+b+c`),
/// preserving configuration order.
pub fn source_key(bindings: &[SourceBinding]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for binding in bindings {
        if !names.iter().any(|n| n.to_lowercase() == binding.name.to_lowercase()) {
            names.push(&binding.name);
        }
    }
    names.join("+")
}

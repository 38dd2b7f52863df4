pub mod post;
pub mod rules;

pub use post::Post;
pub use rules::{source_key, RuleSet, SourceBinding};

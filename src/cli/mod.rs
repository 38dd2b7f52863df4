pub mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reddit-notifier")]
#[command(about = "Notifies about new Reddit posts matching your rules", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "RPN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log every matched post (true/false)
    #[arg(
        short,
        long,
        env = "RPN_LOGGING",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_toggle,
        global = true
    )]
    pub logging: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Watch the configured subreddits (default)
    Watch,
    /// Validate the configuration and subreddits, then exit
    Check,
    /// Send a test notification to every configured target
    Test,
}

/// Boolean-like flag values: `true`, `1`, `yes` and `on` enable, anything
/// else disables.
pub fn parse_toggle(value: &str) -> Result<bool, String> {
    Ok(matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    ))
}

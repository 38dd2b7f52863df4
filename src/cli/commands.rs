use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::{AppContext, Result};
use crate::domain::Post;

/// Validate subreddits, then stream until `cancel` fires.
pub async fn watch(ctx: &AppContext, verbose: bool, cancel: CancellationToken) -> Result<()> {
    let mut supervisor = ctx.supervisor(verbose);
    supervisor.validate_sources().await?;

    info!(
        "Watching {} subreddit bindings, notifying {} targets",
        supervisor.bindings().len(),
        ctx.channels.len()
    );
    supervisor.run(cancel).await
}

pub async fn check(ctx: &AppContext) -> Result<()> {
    ctx.supervisor(false).validate_sources().await?;

    println!("Configuration OK");
    println!("Notification targets: {}", ctx.channels.len());
    for binding in &ctx.config.reddit.subreddits {
        println!("  r/{}: {}", binding.name, binding.rules);
    }
    Ok(())
}

/// Render the configured templates for a sample post and send it to every
/// target.
pub async fn test_notification(ctx: &AppContext) -> Result<()> {
    let subreddit = ctx
        .config
        .reddit
        .subreddits
        .first()
        .map(|b| b.name.as_str())
        .unwrap_or("test");
    let post = Post::new("t3_test", subreddit, "Test notification from reddit-notifier")
        .with_flair("Test");

    let (title, body) = ctx.config.template().render(&post);
    ctx.dispatcher.dispatch(&title, &body).await?;

    println!("Sent test notification to {} targets", ctx.channels.len());
    Ok(())
}

//! Client subcommands: read views and act through an engagement session.

use std::sync::Arc;
use std::time::Duration;

use likeboard_engagement::{
    AuthorityClient, ClientConfig, ControllerConfig, EngagementSession, ItemId, ItemRow,
    ToggleOutcome, Viewer,
};
use miette::{IntoDiagnostic, Result};
use tracing::debug;

use crate::AuthorityArgs;

/// Build a session for the configured token and load the working set.
async fn open_session(args: &AuthorityArgs) -> Result<EngagementSession<AuthorityClient>> {
    let timeout = Duration::from_secs(args.timeout_secs);
    let mut config = ClientConfig::new(&args.authority_url).with_request_timeout(timeout);
    if let Some(token) = &args.token {
        config = config.with_token(token);
    }

    let client = Arc::new(AuthorityClient::new(config).into_diagnostic()?);
    let viewer = match &args.token {
        Some(_) => Viewer::User(client.whoami().await.into_diagnostic()?),
        None => Viewer::Anonymous,
    };

    let mut session = EngagementSession::new(
        client,
        ControllerConfig {
            toggle_timeout: timeout,
        },
    );
    let count = session.sign_in(viewer).await.into_diagnostic()?;
    debug!(count, "session loaded");
    Ok(session)
}

fn render_row(row: &ItemRow) -> String {
    let mut line = format!(
        "{}  {} like{}",
        row.item_id,
        row.like_count,
        if row.like_count == 1 { "" } else { "s" }
    );
    if row.viewer_has_liked {
        line.push_str(" (liked)");
    }
    line.push_str(&format!("  by {}  {}", row.owner_id, row.age));
    if let Some(caption) = &row.caption {
        line.push_str(&format!("  \"{}\"", caption));
    }
    line
}

pub async fn feed(args: &AuthorityArgs) -> Result<()> {
    let session = open_session(args).await?;
    let view = session.feed();
    if view.rows.is_empty() {
        println!("No items yet.");
    }
    for row in &view.rows {
        println!("{}", render_row(row));
    }
    Ok(())
}

pub async fn top(args: &AuthorityArgs, count: usize) -> Result<()> {
    let session = open_session(args).await?;
    for ranked in session.leaderboard(count).rows {
        println!("{}. {}", ranked.rank, render_row(&ranked.row));
    }
    Ok(())
}

pub async fn show(args: &AuthorityArgs, item_id: &str) -> Result<()> {
    let session = open_session(args).await?;
    let detail = session
        .detail(&ItemId::from(item_id))
        .ok_or_else(|| miette::miette!("item {} not found", item_id))?;

    println!("{}", render_row(&detail.row));
    if let Some(url) = &detail.row.image_url {
        println!("  {}", url);
    }
    Ok(())
}

pub async fn like(args: &AuthorityArgs, item_id: &str) -> Result<()> {
    let session = open_session(args).await?;
    let item_id = ItemId::from(item_id);

    match session.toggle(&item_id).await {
        ToggleOutcome::Reconciled {
            like_count,
            viewer_has_liked,
        } => {
            let verb = if viewer_has_liked { "Liked" } else { "Unliked" };
            println!("{} {} ({} likes)", verb, item_id, like_count);
            Ok(())
        }
        ToggleOutcome::RolledBack { notice } => Err(miette::miette!("{}", notice.message())),
        ToggleOutcome::Rejected(reason) => {
            Err(miette::miette!("cannot toggle {}: {:?}", item_id, reason))
        }
        ToggleOutcome::Discarded => Err(miette::miette!("item list changed, try again")),
    }
}

pub async fn delete(args: &AuthorityArgs, item_id: &str) -> Result<()> {
    let session = open_session(args).await?;
    session
        .delete_item(&ItemId::from(item_id))
        .await
        .into_diagnostic()?;
    println!("Deleted {}", item_id);
    Ok(())
}

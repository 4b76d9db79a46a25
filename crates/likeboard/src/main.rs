//! likeboard: like toggling with optimistic clients and a ranked leaderboard.
//!
//! Main binary with subcommands:
//! - `serve`: Run the like authority (HTTP API)
//! - `feed`, `top`, `show`: Read views through a client session
//! - `like`, `delete`: Act on an item as the signed-in user

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod serve;

use likeboard_engagement::DEFAULT_LEADERBOARD_SIZE;

/// Parse a `token=userId` pair.
fn parse_token_pair(s: &str) -> Result<(String, String), String> {
    let (token, user) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid token mapping '{}', expected token=userId", s))?;
    let (token, user) = (token.trim(), user.trim());
    if token.is_empty() || user.is_empty() {
        return Err(format!(
            "invalid token mapping '{}', token and userId must be non-empty",
            s
        ));
    }
    Ok((token.to_string(), user.to_string()))
}

#[derive(Parser)]
#[command(name = "likeboard")]
#[command(about = "Likes, feeds and a top-N leaderboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Connection options shared by the client subcommands.
#[derive(Args, Clone)]
struct AuthorityArgs {
    /// Authority base URL
    #[arg(long, env = "LIKEBOARD_AUTHORITY_URL", default_value = "http://localhost:3000")]
    authority_url: String,

    /// Bearer token identifying the viewer (anonymous when absent)
    #[arg(long, env = "LIKEBOARD_TOKEN")]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the like authority
    Serve {
        /// HTTP listen address
        #[arg(long, env = "LIKEBOARD_LISTEN", default_value = "0.0.0.0:3000")]
        listen: String,

        /// SQLite database path (in-memory store when absent)
        #[arg(long, env = "LIKEBOARD_DB")]
        db: Option<String>,

        /// JSON file with an array of items to load at startup
        #[arg(long)]
        seed: Option<String>,

        /// Accepted bearer tokens as token=userId
        #[arg(
            long = "token",
            env = "LIKEBOARD_TOKENS",
            value_delimiter = ',',
            value_parser = parse_token_pair
        )]
        tokens: Vec<(String, String)>,

        /// Origins allowed to call the API from a browser
        #[arg(long = "allowed-origin", env = "LIKEBOARD_ALLOWED_ORIGINS", value_delimiter = ',')]
        allowed_origins: Vec<String>,
    },

    /// List items from other users, newest first
    Feed {
        #[command(flatten)]
        authority: AuthorityArgs,
    },

    /// Show the most liked items
    Top {
        #[command(flatten)]
        authority: AuthorityArgs,

        /// Number of items to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_LEADERBOARD_SIZE)]
        count: usize,
    },

    /// Show one item
    Show {
        #[command(flatten)]
        authority: AuthorityArgs,

        /// Item id
        item_id: String,
    },

    /// Toggle your like on an item
    Like {
        #[command(flatten)]
        authority: AuthorityArgs,

        /// Item id
        item_id: String,
    },

    /// Delete an item you own
    Delete {
        #[command(flatten)]
        authority: AuthorityArgs,

        /// Item id
        item_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "likeboard=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            db,
            seed,
            tokens,
            allowed_origins,
        } => {
            serve::run(
                &listen,
                db.as_deref(),
                seed.as_deref(),
                tokens,
                &allowed_origins,
            )
            .await
        }
        Commands::Feed { authority } => client::feed(&authority).await,
        Commands::Top { authority, count } => client::top(&authority, count).await,
        Commands::Show { authority, item_id } => client::show(&authority, &item_id).await,
        Commands::Like { authority, item_id } => client::like(&authority, &item_id).await,
        Commands::Delete { authority, item_id } => client::delete(&authority, &item_id).await,
    }
}

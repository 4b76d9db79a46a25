//! The `serve` subcommand.

use std::sync::Arc;

use likeboard_authority::{
    AppState, LikeStore, MemoryStore, SqliteStore, TokenTable, create_router, seed_from_json,
};
use miette::{IntoDiagnostic, Result};
use tracing::{info, warn};

pub async fn run(
    listen: &str,
    db: Option<&str>,
    seed: Option<&str>,
    tokens: Vec<(String, String)>,
    allowed_origins: &[String],
) -> Result<()> {
    let store: Arc<dyn LikeStore> = match db {
        Some(path) => Arc::new(SqliteStore::open(path).into_diagnostic()?),
        None => {
            info!("no database configured, likes are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(path) = seed {
        let json = std::fs::read_to_string(path)
            .map_err(|e| miette::miette!("failed to read seed file {}: {}", path, e))?;
        seed_from_json(store.as_ref(), &json)
            .await
            .into_diagnostic()?;
    }

    let identity: TokenTable = tokens.into_iter().collect();
    if identity.is_empty() {
        warn!("no tokens configured, every toggle will be rejected as unauthorized");
    }

    let state = Arc::new(AppState {
        store,
        identity: Arc::new(identity),
    });
    let router = create_router(state, allowed_origins);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .into_diagnostic()?;
    info!(listen = %listen, "likeboard authority started");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("received shutdown signal");
        })
        .await
        .into_diagnostic()?;

    Ok(())
}

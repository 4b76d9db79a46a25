//! HTTP API for the like authority.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::{get, put},
};
use likeboard_engagement::{
    Item, ItemId, ListItemsResponse, ToggleResponse, WhoAmIResponse,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::auth::{AuthenticatedUser, IdentityResolver};
use crate::error::AuthorityError;
use crate::store::LikeStore;

/// Shared application state.
pub struct AppState {
    pub store: Arc<dyn LikeStore>,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Create the API router.
///
/// Cross-origin requests are allowed only from `allowed_origins`.
pub fn create_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/whoami", get(whoami))
        .route("/api/items", get(list_items))
        .route("/api/items/{item_id}", get(get_item).delete(delete_item))
        .route("/api/items/{item_id}/like", put(toggle_like))
        .with_state(state);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return router;
    }

    info!(count = origins.len(), "CORS enabled");
    router.layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn whoami(AuthenticatedUser(user_id): AuthenticatedUser) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse { user_id })
}

async fn list_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListItemsResponse>, AuthorityError> {
    let items = state.store.list_items().await?;
    Ok(Json(ListItemsResponse { items }))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<Json<Item>, AuthorityError> {
    let item = state.store.get_item(&ItemId(item_id)).await?;
    Ok(Json(item))
}

#[tracing::instrument(skip(state, user_id), fields(user = %user_id.0))]
async fn toggle_like(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(item_id): Path<String>,
) -> Result<Json<ToggleResponse>, AuthorityError> {
    let response = state.store.toggle_like(&ItemId(item_id), &user_id).await?;
    Ok(Json(response))
}

#[tracing::instrument(skip(state, user_id), fields(user = %user_id.0))]
async fn delete_item(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(item_id): Path<String>,
) -> Result<StatusCode, AuthorityError> {
    state.store.delete_item(&ItemId(item_id), &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

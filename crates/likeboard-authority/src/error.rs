//! Error types for the authority.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use likeboard_engagement::{ErrorBody, ItemId};
use thiserror::Error;
use tracing::error;

/// Errors that can occur while serving likes.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Item does not exist.
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// Missing or unknown bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Identity is valid but may not perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store cannot serve the request right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// SQLite error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Seed data could not be parsed.
    #[error("invalid seed data: {0}")]
    Seed(#[from] serde_json::Error),
}

impl AuthorityError {
    /// Wire kind and status code.
    fn classify(&self) -> (&'static str, StatusCode) {
        match self {
            AuthorityError::NotFound(_) => ("NotFound", StatusCode::NOT_FOUND),
            AuthorityError::Unauthorized(_) => ("Unauthorized", StatusCode::UNAUTHORIZED),
            AuthorityError::Forbidden(_) => ("Forbidden", StatusCode::FORBIDDEN),
            AuthorityError::Unavailable(_)
            | AuthorityError::Storage(_)
            | AuthorityError::Seed(_) => ("Transient", StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}

impl IntoResponse for AuthorityError {
    fn into_response(self) -> Response {
        let (kind, status) = self.classify();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: kind.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

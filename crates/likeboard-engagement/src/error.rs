//! Error types for the engagement client.

use std::time::Duration;

use thiserror::Error;

use crate::ItemId;

/// Errors that can occur when talking to the toggle authority.
#[derive(Debug, Error)]
pub enum EngagementError {
    /// Missing, expired or mismatched identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The item does not exist (possibly deleted concurrently).
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// The owner check failed for a destructive operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Storage or network trouble on the authority side.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The authority did not answer in time.
    #[error("authority call timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// The wire-level classification of an authority failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Transient,
}

impl EngagementError {
    /// Classify this error. Anything that is not a definite answer from the
    /// authority counts as transient.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngagementError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngagementError::NotFound(_) => ErrorKind::NotFound,
            EngagementError::Forbidden(_) => ErrorKind::Forbidden,
            EngagementError::Transient(_)
            | EngagementError::Timeout(_)
            | EngagementError::Http(_)
            | EngagementError::Json(_)
            | EngagementError::InvalidResponse(_) => ErrorKind::Transient,
        }
    }

    /// Whether a read may be retried: network trouble or an authority-side
    /// failure (5xx, 429). Toggles are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngagementError::Transient(_) => true,
            EngagementError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

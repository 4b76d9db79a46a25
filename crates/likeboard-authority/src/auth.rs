//! Bearer-token identity resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use likeboard_engagement::UserId;
use tracing::debug;

use crate::error::AuthorityError;
use crate::routes::AppState;

/// Resolves an opaque bearer token to a user.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Static token table, configured at startup.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, UserId>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user. A repeated token replaces the old user.
    pub fn insert(&mut self, token: impl Into<String>, user_id: impl Into<UserId>) {
        self.tokens.insert(token.into(), user_id.into());
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        self.insert(token, user_id);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<T, U> FromIterator<(T, U)> for TokenTable
where
    T: Into<String>,
    U: Into<UserId>,
{
    fn from_iter<I: IntoIterator<Item = (T, U)>>(iter: I) -> Self {
        let mut table = TokenTable::new();
        for (token, user_id) in iter {
            table.insert(token, user_id);
        }
        table
    }
}

#[async_trait]
impl IdentityResolver for TokenTable {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).cloned()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The caller's resolved identity. Rejects with 401 when absent or unknown.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserId);

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthorityError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AuthorityError::Unauthorized("missing bearer token".to_string()))?;

        match state.identity.resolve(token).await {
            Some(user_id) => Ok(AuthenticatedUser(user_id)),
            None => {
                debug!("rejected unknown token");
                Err(AuthorityError::Unauthorized("invalid token".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(bearer_token(&headers), Some("tok-1"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_token_table() {
        let table: TokenTable = [("tok-a", "alice"), ("tok-b", "bob")].into_iter().collect();

        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("tok-a").await, Some(UserId::from("alice")));
        assert_eq!(table.resolve("nope").await, None);
    }
}

//! HTTP client for the likeboard authority.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    EngagementError, ErrorBody, Item, ItemId, ItemSource, ListItemsResponse, ToggleAuthority,
    ToggleResponse, UserId, WhoAmIResponse,
};

/// Connection settings for [`AuthorityClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the authority, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Bearer token issued by the authentication collaborator.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client for the authority's JSON API.
///
/// Reads (`list_items`, `whoami`, `get_item`) retry network errors and
/// 5xx/429 answers with backoff.
/// Toggles are sent exactly once.
pub struct AuthorityClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl AuthorityClient {
    /// Create a client from its configuration.
    pub fn new(config: ClientConfig) -> Result<Self, EngagementError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bearer(&self) -> Result<&str, EngagementError> {
        self.token
            .as_deref()
            .ok_or_else(|| EngagementError::Unauthorized("not signed in".to_string()))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Resolve the identity behind the configured token.
    pub async fn whoami(&self) -> Result<UserId, EngagementError> {
        self.bearer()?;
        let url = format!("{}/api/whoami", self.base_url);
        let response: WhoAmIResponse = self.get_with_retry(&url, None).await?;
        debug!(user = %response.user_id, "resolved viewer identity");
        Ok(response.user_id)
    }

    /// Fetch a single item.
    pub async fn get_item(&self, item_id: &ItemId) -> Result<Item, EngagementError> {
        let url = format!("{}/api/items/{}", self.base_url, item_id);
        self.get_with_retry(&url, Some(item_id)).await
    }

    /// GET with up to three retries on network or 5xx/429 failure (500ms, 1s, 2s).
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        item_id: Option<&ItemId>,
    ) -> Result<T, EngagementError> {
        let mut attempt = 0;
        loop {
            let result = match self.authorized(self.http.get(url)).send().await {
                Ok(response) => Self::handle_response(response, item_id).await,
                Err(e) => Err(EngagementError::from(e)),
            };

            match result {
                Err(ref e) if e.is_retryable() && attempt < 3 => {
                    let backoff_ms = 500 * (1 << attempt);
                    debug!(
                        attempt = attempt + 1,
                        backoff_ms,
                        error = %e,
                        "transient error on read, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Map an HTTP response onto the error taxonomy and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
        item_id: Option<&ItemId>,
    ) -> Result<T, EngagementError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);

        Err(match status {
            StatusCode::UNAUTHORIZED => EngagementError::Unauthorized(message),
            StatusCode::FORBIDDEN => EngagementError::Forbidden(message),
            StatusCode::NOT_FOUND => match item_id {
                Some(id) => EngagementError::NotFound(id.clone()),
                None => EngagementError::InvalidResponse(format!("not found: {}", message)),
            },
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                EngagementError::Transient(format!("{}: {}", s, message))
            }
            s => EngagementError::InvalidResponse(format!("request failed ({}): {}", s, message)),
        })
    }
}

#[async_trait]
impl ToggleAuthority for AuthorityClient {
    async fn toggle_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ToggleResponse, EngagementError> {
        let token = self.bearer()?;
        let url = format!("{}/api/items/{}/like", self.base_url, item_id);

        let response = self
            .http
            .put(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| {
                warn!(item = %item_id, user = %user_id, error = %e, "toggle request failed");
                EngagementError::from(e)
            })?;

        let toggled: ToggleResponse = Self::handle_response(response, Some(item_id)).await?;
        debug!(
            item = %item_id,
            like_count = toggled.new_like_count,
            liked = toggled.viewer_now_likes,
            "authority toggled like"
        );
        Ok(toggled)
    }
}

#[async_trait]
impl ItemSource for AuthorityClient {
    async fn list_items(&self) -> Result<Vec<Item>, EngagementError> {
        let url = format!("{}/api/items", self.base_url);
        let response: ListItemsResponse = self.get_with_retry(&url, None).await?;
        debug!(count = response.items.len(), "listed items");
        Ok(response.items)
    }

    async fn delete_item(
        &self,
        item_id: &ItemId,
        _user_id: &UserId,
    ) -> Result<(), EngagementError> {
        let token = self.bearer()?;
        let url = format!("{}/api/items/{}", self.base_url, item_id);

        let response = self
            .http
            .delete(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        Self::handle_response::<serde_json::Value>(response, Some(item_id))
            .await
            .map(|_| ())
    }
}

//! A client session: viewer identity, cache, controller and item source.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::EngagementCache;
use crate::controller::{ControllerConfig, ToggleController, ToggleOutcome};
use crate::views::{DetailView, FeedView, LeaderboardView};
use crate::{EngagementError, ItemId, ItemSource, ToggleAuthority, Viewer};

/// Ties one viewer to one cache.
///
/// Every identity change reloads the working set, so `viewer_has_liked` is
/// always derived for the current viewer.
pub struct EngagementSession<A: ?Sized> {
    viewer: Viewer,
    source: Arc<A>,
    controller: ToggleController<A>,
}

impl<A> EngagementSession<A>
where
    A: ToggleAuthority + ItemSource + ?Sized,
{
    /// Create an anonymous session with an empty cache.
    pub fn new(authority: Arc<A>, config: ControllerConfig) -> Self {
        let controller =
            ToggleController::with_config(EngagementCache::new(), Arc::clone(&authority), config);
        Self {
            viewer: Viewer::Anonymous,
            source: authority,
            controller,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn cache(&self) -> &Arc<EngagementCache> {
        self.controller.cache()
    }

    /// Reload the working set from the item source.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize, EngagementError> {
        let items = self.source.list_items().await?;
        let count = items.len();
        self.cache().load(items, &self.viewer);
        Ok(count)
    }

    /// Switch to a signed-in viewer, empty the cache and reload.
    ///
    /// If the reload fails the cache stays empty; rows derived for the
    /// previous viewer are never shown to the new one.
    pub async fn sign_in(&mut self, viewer: Viewer) -> Result<usize, EngagementError> {
        info!(viewer = ?viewer.user_id(), "signing in");
        self.viewer = viewer;
        self.cache().clear();
        self.refresh().await
    }

    /// Drop the identity, empty the cache and reload anonymously.
    pub async fn sign_out(&mut self) -> Result<usize, EngagementError> {
        info!("signing out");
        self.viewer = Viewer::Anonymous;
        self.cache().clear();
        self.refresh().await
    }

    /// Toggle the current viewer's like on `item_id`.
    pub async fn toggle(&self, item_id: &ItemId) -> ToggleOutcome {
        self.controller.request_toggle(item_id, &self.viewer).await
    }

    /// Delete an item the viewer owns, then drop it from the cache.
    #[tracing::instrument(skip(self), fields(item = %item_id))]
    pub async fn delete_item(&self, item_id: &ItemId) -> Result<(), EngagementError> {
        let user_id = self
            .viewer
            .user_id()
            .ok_or_else(|| EngagementError::Unauthorized("sign in to delete items".to_string()))?;

        self.source.delete_item(item_id, user_id).await?;
        self.cache().remove(item_id);
        debug!("item deleted");
        Ok(())
    }

    pub fn feed(&self) -> FeedView {
        FeedView::build(&self.cache().snapshot(), &self.viewer, Utc::now())
    }

    pub fn leaderboard(&self, n: usize) -> LeaderboardView {
        LeaderboardView::build(&self.cache().snapshot(), &self.viewer, n, Utc::now())
    }

    pub fn detail(&self, item_id: &ItemId) -> Option<DetailView> {
        self.cache()
            .get(item_id)
            .map(|entry| DetailView::build(&entry, &self.viewer, Utc::now()))
    }
}

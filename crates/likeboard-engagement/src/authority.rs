//! Seams between the client-side core and the authority collaborator.

use async_trait::async_trait;

use crate::{EngagementError, Item, ItemId, ToggleResponse, UserId};

/// The single writer of like ground truth.
///
/// `toggle_like` flips membership of `user_id` in the item's liker set and
/// reports the result. Calling it twice flips twice, so callers must never
/// retry it on failure.
#[async_trait]
pub trait ToggleAuthority: Send + Sync {
    async fn toggle_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ToggleResponse, EngagementError>;
}

/// Listing and removal of items (the ingestion/listing collaborator).
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Current snapshot of all items.
    async fn list_items(&self) -> Result<Vec<Item>, EngagementError>;

    /// Delete an item on behalf of its owner.
    async fn delete_item(&self, item_id: &ItemId, user_id: &UserId)
    -> Result<(), EngagementError>;
}

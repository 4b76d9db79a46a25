//! In-memory like store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use likeboard_engagement::{Item, ItemId, ToggleResponse, UserId};
use tracing::debug;

use super::{LikeStore, normalize, sort_newest_first};
use crate::error::AuthorityError;

/// Items keyed by id. A toggle holds the item's shard write lock for the
/// whole membership check and update.
#[derive(Default)]
pub struct MemoryStore {
    items: DashMap<ItemId, Item>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LikeStore for MemoryStore {
    async fn list_items(&self) -> Result<Vec<Item>, AuthorityError> {
        let mut items: Vec<Item> = self.items.iter().map(|r| r.value().clone()).collect();
        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn get_item(&self, item_id: &ItemId) -> Result<Item, AuthorityError> {
        self.items
            .get(item_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AuthorityError::NotFound(item_id.clone()))
    }

    async fn toggle_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ToggleResponse, AuthorityError> {
        let mut item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| AuthorityError::NotFound(item_id.clone()))?;

        let viewer_now_likes = if item.liker_ids.remove(user_id) {
            false
        } else {
            item.liker_ids.insert(user_id.clone());
            true
        };
        item.like_count = item.liker_ids.len() as u64;

        debug!(item = %item_id, user = %user_id, like_count = item.like_count, viewer_now_likes, "toggled like");
        Ok(ToggleResponse {
            new_like_count: item.like_count,
            viewer_now_likes,
        })
    }

    async fn insert_item(&self, item: Item) -> Result<(), AuthorityError> {
        let item = normalize(item);
        self.items.insert(item.item_id.clone(), item);
        Ok(())
    }

    async fn delete_item(&self, item_id: &ItemId, user_id: &UserId) -> Result<(), AuthorityError> {
        match self.items.entry(item_id.clone()) {
            Entry::Vacant(_) => Err(AuthorityError::NotFound(item_id.clone())),
            Entry::Occupied(entry) if &entry.get().owner_id != user_id => Err(
                AuthorityError::Forbidden("only the owner can delete this item".to_string()),
            ),
            Entry::Occupied(entry) => {
                entry.remove();
                debug!(item = %item_id, "deleted item");
                Ok(())
            }
        }
    }
}

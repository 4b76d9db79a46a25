//! Like storage.
//!
//! The store is the single owner of every liker set. `toggle_like` must be
//! atomic per item: concurrent toggles by different users are all counted,
//! and two concurrent toggles by one user serialize.

mod memory;
mod sqlite;

use async_trait::async_trait;
use likeboard_engagement::{Item, ItemId, ToggleResponse, UserId};
use tracing::{info, warn};

use crate::error::AuthorityError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Authoritative storage for items and their liker sets.
#[async_trait]
pub trait LikeStore: Send + Sync {
    /// All items, newest first.
    async fn list_items(&self) -> Result<Vec<Item>, AuthorityError>;

    async fn get_item(&self, item_id: &ItemId) -> Result<Item, AuthorityError>;

    /// Add the user to the item's liker set if absent, remove them if present.
    async fn toggle_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ToggleResponse, AuthorityError>;

    /// Insert or replace an item. `like_count` is recomputed from the liker set.
    async fn insert_item(&self, item: Item) -> Result<(), AuthorityError>;

    /// Delete an item. Only its owner may do so.
    async fn delete_item(&self, item_id: &ItemId, user_id: &UserId) -> Result<(), AuthorityError>;
}

/// Load a JSON array of items into a store.
pub async fn seed_from_json(store: &dyn LikeStore, json: &str) -> Result<usize, AuthorityError> {
    let items: Vec<Item> = serde_json::from_str(json)?;
    let count = items.len();
    for item in items {
        store.insert_item(item).await?;
    }
    info!(count, "seeded items");
    Ok(count)
}

/// Force `like_count` to match the liker set.
pub(crate) fn normalize(mut item: Item) -> Item {
    let actual = item.liker_ids.len() as u64;
    if item.like_count != actual {
        warn!(
            item = %item.item_id,
            claimed = item.like_count,
            actual,
            "like count disagrees with liker set, using liker set"
        );
        item.like_count = actual;
    }
    item
}

/// Newest first; item id breaks ties.
pub(crate) fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

/// Shared behaviour tests, run against both stores.
#[cfg(test)]
pub(crate) mod contract {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    pub fn item(id: &str, owner: &str, minute: i64, likers: &[&str]) -> Item {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut item = Item::new(id, owner, base + Duration::minutes(minute));
        item.liker_ids = likers.iter().map(|u| UserId::from(*u)).collect();
        item.like_count = item.liker_ids.len() as u64;
        item
    }

    pub async fn toggle_adds_then_removes(store: &dyn LikeStore) {
        store.insert_item(item("m1", "bob", 0, &["carol"])).await.unwrap();
        let m1 = ItemId::from("m1");
        let alice = UserId::from("alice");

        let first = store.toggle_like(&m1, &alice).await.unwrap();
        assert_eq!(
            first,
            ToggleResponse {
                new_like_count: 2,
                viewer_now_likes: true
            }
        );
        assert!(store.get_item(&m1).await.unwrap().is_liked_by(&alice));

        let second = store.toggle_like(&m1, &alice).await.unwrap();
        assert_eq!(
            second,
            ToggleResponse {
                new_like_count: 1,
                viewer_now_likes: false
            }
        );
        assert!(!store.get_item(&m1).await.unwrap().is_liked_by(&alice));
    }

    pub async fn toggle_unknown_item(store: &dyn LikeStore) {
        let err = store
            .toggle_like(&ItemId::from("nope"), &UserId::from("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::NotFound(_)));
    }

    pub async fn list_newest_first(store: &dyn LikeStore) {
        store.insert_item(item("old", "bob", 0, &[])).await.unwrap();
        store.insert_item(item("new", "bob", 10, &["alice"])).await.unwrap();
        store.insert_item(item("mid", "carol", 5, &[])).await.unwrap();

        let ids: Vec<String> = store
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.item_id.0)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    pub async fn insert_normalizes_count(store: &dyn LikeStore) {
        let mut bad = item("m1", "bob", 0, &["alice", "carol"]);
        bad.like_count = 40;
        store.insert_item(bad).await.unwrap();

        assert_eq!(store.get_item(&ItemId::from("m1")).await.unwrap().like_count, 2);
    }

    pub async fn delete_owner_only(store: &dyn LikeStore) {
        store.insert_item(item("m1", "bob", 0, &["alice"])).await.unwrap();
        let m1 = ItemId::from("m1");

        let err = store.delete_item(&m1, &UserId::from("alice")).await.unwrap_err();
        assert!(matches!(err, AuthorityError::Forbidden(_)));

        store.delete_item(&m1, &UserId::from("bob")).await.unwrap();
        assert!(matches!(
            store.get_item(&m1).await.unwrap_err(),
            AuthorityError::NotFound(_)
        ));
        assert!(matches!(
            store.delete_item(&m1, &UserId::from("bob")).await.unwrap_err(),
            AuthorityError::NotFound(_)
        ));
    }

    pub async fn concurrent_users_all_counted(store: Arc<dyn LikeStore>) {
        store.insert_item(item("m1", "owner", 0, &[])).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .toggle_like(&ItemId::from("m1"), &UserId(format!("user{}", i)))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().viewer_now_likes);
        }

        let item = store.get_item(&ItemId::from("m1")).await.unwrap();
        assert_eq!(item.like_count, 20);
        assert_eq!(item.liker_ids.len(), 20);
    }

    pub async fn same_user_toggles_serialize(store: Arc<dyn LikeStore>) {
        store.insert_item(item("m1", "owner", 0, &["bob"])).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .toggle_like(&ItemId::from("m1"), &UserId::from("alice"))
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results.sort_by_key(|r| r.new_like_count);

        // One add, one remove, in some order.
        assert_eq!(
            results,
            vec![
                ToggleResponse {
                    new_like_count: 1,
                    viewer_now_likes: false
                },
                ToggleResponse {
                    new_like_count: 2,
                    viewer_now_likes: true
                },
            ]
        );
        let item = store.get_item(&ItemId::from("m1")).await.unwrap();
        assert_eq!(item.like_count, 1);
        assert!(!item.is_liked_by(&UserId::from("alice")));
    }
}

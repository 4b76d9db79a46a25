//! Read-only projections over a cache snapshot.
//!
//! Views hold no state of their own. Each one is rebuilt from
//! [`EngagementCache::snapshot`](crate::cache::EngagementCache::snapshot)
//! when the cache broadcasts a change.

use chrono::{DateTime, Utc};

use crate::ranking::rank_entries;
use crate::{EngagementEntry, ItemId, UserId, Viewer};

/// Relative age label for an item.
pub fn format_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created_at);
    let minutes = elapsed.num_minutes();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

/// One rendered row, shared by all views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub item_id: ItemId,
    pub owner_id: UserId,
    pub like_count: u64,
    pub viewer_has_liked: bool,
    /// A toggle is outstanding; the like control shows a pending indicator.
    pub pending: bool,
    /// The viewer may toggle this item.
    pub can_like: bool,
    pub caption: Option<String>,
    pub image_url: Option<String>,
    pub age: String,
}

impl ItemRow {
    fn project(entry: &EngagementEntry, viewer: &Viewer, now: DateTime<Utc>) -> Self {
        Self {
            item_id: entry.item_id.clone(),
            owner_id: entry.owner_id.clone(),
            like_count: entry.like_count,
            viewer_has_liked: entry.viewer_has_liked,
            pending: entry.in_flight(),
            can_like: viewer.user_id().is_some() && !viewer.owns(&entry.owner_id),
            caption: entry.caption.clone(),
            image_url: entry.image_url.clone(),
            age: format_age(entry.created_at, now),
        }
    }
}

/// Everything except the viewer's own items, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedView {
    pub rows: Vec<ItemRow>,
}

impl FeedView {
    pub fn build(entries: &[EngagementEntry], viewer: &Viewer, now: DateTime<Utc>) -> Self {
        let mut visible: Vec<&EngagementEntry> = entries
            .iter()
            .filter(|entry| !viewer.owns(&entry.owner_id))
            .collect();
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });

        Self {
            rows: visible
                .into_iter()
                .map(|entry| ItemRow::project(entry, viewer, now))
                .collect(),
        }
    }
}

/// A ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRow {
    /// 1-based position.
    pub rank: usize,
    pub row: ItemRow,
}

/// The top `n` items by like count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardView {
    pub rows: Vec<RankedRow>,
}

impl LeaderboardView {
    pub fn build(
        entries: &[EngagementEntry],
        viewer: &Viewer,
        n: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let rows = rank_entries(entries, n)
            .iter()
            .enumerate()
            .map(|(i, entry)| RankedRow {
                rank: i + 1,
                row: ItemRow::project(entry, viewer, now),
            })
            .collect();
        Self { rows }
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.rows.iter().map(|r| r.row.item_id.clone()).collect()
    }
}

/// A single item by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub row: ItemRow,
}

impl DetailView {
    pub fn build(entry: &EngagementEntry, viewer: &Viewer, now: DateTime<Utc>) -> Self {
        Self {
            row: ItemRow::project(entry, viewer, now),
        }
    }
}

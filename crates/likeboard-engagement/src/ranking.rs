//! Top-N ranking over a cache snapshot.
//!
//! Ranking is recomputed from scratch on every call. It holds no state, so it
//! can never drift from the cache it was computed from.

use std::cmp::Ordering;

use crate::{EngagementEntry, ItemId};

/// Number of items the leaderboard shows by default.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 3;

/// Leaderboard order: most likes first, then most recent, then item id.
///
/// The item id only matters when two items share both count and timestamp;
/// it makes the order total so repeated calls on one snapshot agree.
pub fn compare_entries(a: &EngagementEntry, b: &EngagementEntry) -> Ordering {
    b.like_count
        .cmp(&a.like_count)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// The `n` highest-ranked entries, best first.
pub fn rank_entries<'a, I>(entries: I, n: usize) -> Vec<EngagementEntry>
where
    I: IntoIterator<Item = &'a EngagementEntry>,
{
    if n == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<EngagementEntry> = entries.into_iter().cloned().collect();
    ranked.sort_by(compare_entries);
    ranked.truncate(n);
    ranked
}

/// Ids of the `n` highest-ranked entries, best first.
pub fn top_n<'a, I>(entries: I, n: usize) -> Vec<ItemId>
where
    I: IntoIterator<Item = &'a EngagementEntry>,
{
    rank_entries(entries, n)
        .into_iter()
        .map(|entry| entry.item_id)
        .collect()
}

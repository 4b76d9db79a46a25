//! In-memory engagement cache shared by every view of a client session.
//!
//! The cache has a single writer role (the toggle controller plus the
//! full-replace load path) and any number of readers. Every mutation
//! replaces one entry while holding that entry's shard lock, so readers see
//! either the last reconciled state or a currently optimistic state, never a
//! partially written row.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::{EngagementEntry, Item, ItemId, TogglePhase, Viewer};

/// Broadcast channel capacity for cache updates.
const BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// Update event for cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// The working set was replaced wholesale.
    Loaded { generation: u64, count: usize },
    /// One entry changed (optimistic, reconciled or rolled back).
    EntryChanged { item_id: ItemId },
    /// An entry left the working set.
    Removed { item_id: ItemId },
    /// The cache was emptied (sign-out).
    Cleared,
}

/// Handle for one outstanding toggle. Only the holder of the matching ticket
/// can settle a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    item_id: ItemId,
    id: u64,
    prior: (u64, bool),
}

impl Ticket {
    /// The item this toggle targets.
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// `(like_count, viewer_has_liked)` as they were when the prediction
    /// was applied. This is the rollback point.
    pub fn prior(&self) -> (u64, bool) {
        self.prior
    }
}

/// Result of [`EngagementCache::apply_optimistic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimistic {
    /// Predicted values applied; settle with the ticket.
    Applied(Ticket),
    /// A toggle for this item is already outstanding. Nothing changed.
    AlreadyInFlight,
    /// The item is not in the working set. Nothing changed.
    Untracked,
}

/// Result of [`EngagementCache::reconcile`] and [`EngagementCache::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// The entry was overwritten and is idle again.
    Applied,
    /// The entry no longer belongs to this ticket (a load replaced it).
    Stale,
    /// The item left the working set.
    Untracked,
}

/// Shared cache of engagement entries keyed by item id.
pub struct EngagementCache {
    entries: DashMap<ItemId, EngagementEntry>,
    /// Number of completed loads.
    generation: AtomicU64,
    /// Source of toggle tickets.
    next_ticket: AtomicU64,
    updates_tx: broadcast::Sender<CacheUpdate>,
}

impl EngagementCache {
    /// Create a new empty cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to cache updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates_tx.subscribe()
    }

    fn broadcast(&self, update: CacheUpdate) {
        if self.updates_tx.send(update).is_err() {
            trace!("no subscribers for cache update");
        }
    }

    /// Number of completed loads.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Replace the working set.
    ///
    /// `viewer_has_liked` is derived from liker-set membership for `viewer`.
    /// Pending markers are discarded: a toggle still in flight for any item
    /// will find its ticket stale when it settles.
    pub fn load(&self, items: impl IntoIterator<Item = Item>, viewer: &Viewer) {
        let fresh: HashMap<ItemId, EngagementEntry> = items
            .into_iter()
            .map(|item| {
                let entry = EngagementEntry::from_item(item, viewer);
                (entry.item_id.clone(), entry)
            })
            .collect();

        let mut discarded = 0usize;
        self.entries.retain(|id, entry| {
            if entry.in_flight() {
                discarded += 1;
            }
            fresh.contains_key(id)
        });

        let count = fresh.len();
        for (id, entry) in fresh {
            self.entries.insert(id, entry);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if discarded > 0 {
            debug!(discarded, "load discarded in-flight toggles");
        }
        info!(generation, count, "engagement cache loaded");
        self.broadcast(CacheUpdate::Loaded { generation, count });
    }

    /// Apply predicted post-toggle values and mark the entry pending.
    ///
    /// `predict` maps the current `(like_count, viewer_has_liked)` to the
    /// predicted pair. Reading the current values, predicting and writing
    /// all happen under the entry's lock, so a concurrent load can never be
    /// overwritten by a prediction made from the row it replaced.
    pub fn apply_optimistic<F>(&self, item_id: &ItemId, predict: F) -> Optimistic
    where
        F: FnOnce(u64, bool) -> (u64, bool),
    {
        let (ticket, predicted) = {
            let Some(mut entry) = self.entries.get_mut(item_id) else {
                return Optimistic::Untracked;
            };
            if entry.in_flight() {
                trace!(item = %item_id, "optimistic update rejected: already in flight");
                return Optimistic::AlreadyInFlight;
            }

            let prior = entry.engagement();
            let (like_count, viewer_has_liked) = predict(prior.0, prior.1);
            let id = self.next_ticket.fetch_add(1, Ordering::SeqCst);
            *entry = EngagementEntry {
                like_count,
                viewer_has_liked,
                phase: TogglePhase::Pending { ticket: id },
                ..entry.clone()
            };
            let ticket = Ticket {
                item_id: item_id.clone(),
                id,
                prior,
            };
            (ticket, (like_count, viewer_has_liked))
        };

        debug!(
            item = %item_id,
            like_count = predicted.0,
            liked = predicted.1,
            "cache: optimistic applied"
        );
        self.broadcast(CacheUpdate::EntryChanged {
            item_id: item_id.clone(),
        });
        Optimistic::Applied(ticket)
    }

    /// Overwrite the entry with authority-confirmed values and clear the
    /// pending marker. Always wins over the optimistic values.
    pub fn reconcile(&self, ticket: &Ticket, like_count: u64, has_liked: bool) -> Settle {
        let settled = self.settle(ticket, like_count, has_liked);
        if settled == Settle::Applied {
            debug!(item = %ticket.item_id, like_count, liked = has_liked, "cache: reconciled");
        }
        settled
    }

    /// Restore the pre-toggle values and clear the pending marker.
    pub fn rollback(&self, ticket: &Ticket, prior_like_count: u64, prior_has_liked: bool) -> Settle {
        let settled = self.settle(ticket, prior_like_count, prior_has_liked);
        if settled == Settle::Applied {
            debug!(
                item = %ticket.item_id,
                like_count = prior_like_count,
                liked = prior_has_liked,
                "cache: rolled back"
            );
        }
        settled
    }

    fn settle(&self, ticket: &Ticket, like_count: u64, has_liked: bool) -> Settle {
        {
            let Some(mut entry) = self.entries.get_mut(&ticket.item_id) else {
                debug!(item = %ticket.item_id, "settle dropped: item no longer tracked");
                return Settle::Untracked;
            };
            if entry.phase != (TogglePhase::Pending { ticket: ticket.id }) {
                debug!(item = %ticket.item_id, "settle dropped: ticket is stale");
                return Settle::Stale;
            }
            *entry = EngagementEntry {
                like_count,
                viewer_has_liked: has_liked,
                phase: TogglePhase::Idle,
                ..entry.clone()
            };
        }

        self.broadcast(CacheUpdate::EntryChanged {
            item_id: ticket.item_id.clone(),
        });
        Settle::Applied
    }

    /// Drop one item from the working set.
    pub fn remove(&self, item_id: &ItemId) -> Option<EngagementEntry> {
        let removed = self.entries.remove(item_id).map(|(_, entry)| entry);
        if removed.is_some() {
            self.broadcast(CacheUpdate::Removed {
                item_id: item_id.clone(),
            });
            trace!(item = %item_id, "cache: entry removed");
        }
        removed
    }

    /// Empty the working set.
    pub fn clear(&self) {
        self.entries.clear();
        self.broadcast(CacheUpdate::Cleared);
        debug!("engagement cache cleared");
    }

    /// Get an entry by item id.
    pub fn get(&self, item_id: &ItemId) -> Option<EngagementEntry> {
        self.entries.get(item_id).map(|r| r.value().clone())
    }

    /// Whether a toggle is outstanding for this item.
    pub fn is_in_flight(&self, item_id: &ItemId) -> bool {
        self.entries.get(item_id).is_some_and(|r| r.value().in_flight())
    }

    /// Copy of every entry, in no particular order.
    pub fn snapshot(&self) -> Vec<EngagementEntry> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EngagementCache {
    fn default() -> Self {
        let (updates_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            next_ticket: AtomicU64::new(1),
            updates_tx,
        }
    }
}

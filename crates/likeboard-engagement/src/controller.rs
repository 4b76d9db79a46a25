//! Toggle controller: optimistic apply, authority call, reconcile or rollback.
//!
//! Per item the controller walks `Idle -> Pending -> {Reconciled, RolledBack}
//! -> Idle`. `Pending` is the only state that rejects a second request, and
//! the authority is never called twice for one user action.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{EngagementCache, Optimistic, Settle};
use crate::{EngagementError, ErrorKind, ItemId, ToggleAuthority, Viewer};

/// Default bound on a single authority call.
pub const DEFAULT_TOGGLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bound on the authority call. A timeout is treated like any failure.
    pub toggle_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            toggle_timeout: DEFAULT_TOGGLE_TIMEOUT,
        }
    }
}

/// Why a request never reached the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Viewer has no resolved identity.
    Anonymous,
    /// Item is not in the working set.
    UnknownItem,
    /// A toggle for this item is already outstanding.
    InFlight,
}

/// User-visible, non-fatal notice after a failed toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureNotice {
    /// Session expired or identity mismatch.
    SignInAgain,
    /// The item was deleted; it disappears on the next load.
    ItemGone,
    /// Network or storage trouble; the user may try again.
    TryAgain,
}

impl FailureNotice {
    fn from_error(err: &EngagementError) -> Self {
        match err.kind() {
            ErrorKind::Unauthorized | ErrorKind::Forbidden => FailureNotice::SignInAgain,
            ErrorKind::NotFound => FailureNotice::ItemGone,
            ErrorKind::Transient => FailureNotice::TryAgain,
        }
    }

    /// Message suitable for showing to the user.
    pub fn message(&self) -> &'static str {
        match self {
            FailureNotice::SignInAgain => "please sign in again",
            FailureNotice::ItemGone => "this item is no longer available",
            FailureNotice::TryAgain => "couldn't update, try again",
        }
    }
}

/// How a toggle request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Rejected before any authority call; the cache is unchanged.
    Rejected(RejectReason),
    /// The authority confirmed; the cache holds its values.
    Reconciled {
        like_count: u64,
        viewer_has_liked: bool,
    },
    /// The authority call failed; the cache holds the pre-toggle values.
    RolledBack { notice: FailureNotice },
    /// The cache was reloaded while the call was outstanding; the response
    /// was dropped.
    Discarded,
}

/// Flip the like flag; the count moves with it and never goes below zero.
fn predict_toggle(like_count: u64, has_liked: bool) -> (u64, bool) {
    if has_liked {
        (like_count.saturating_sub(1), false)
    } else {
        (like_count + 1, true)
    }
}

/// Mediates between user actions, the shared cache and the authority.
pub struct ToggleController<A: ?Sized> {
    cache: Arc<EngagementCache>,
    authority: Arc<A>,
    config: ControllerConfig,
}

impl<A: ToggleAuthority + ?Sized> ToggleController<A> {
    /// Create a controller with default settings.
    pub fn new(cache: Arc<EngagementCache>, authority: Arc<A>) -> Self {
        Self::with_config(cache, authority, ControllerConfig::default())
    }

    /// Create a controller with explicit settings.
    pub fn with_config(
        cache: Arc<EngagementCache>,
        authority: Arc<A>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            cache,
            authority,
            config,
        }
    }

    /// The cache this controller writes to.
    pub fn cache(&self) -> &Arc<EngagementCache> {
        &self.cache
    }

    /// Toggle the viewer's like on `item_id`.
    #[tracing::instrument(skip(self, viewer), fields(item = %item_id))]
    pub async fn request_toggle(&self, item_id: &ItemId, viewer: &Viewer) -> ToggleOutcome {
        let Some(user_id) = viewer.user_id() else {
            debug!("toggle rejected: anonymous viewer");
            return ToggleOutcome::Rejected(RejectReason::Anonymous);
        };

        // Snapshot, prediction and optimistic write happen atomically in the
        // cache; the ticket carries the rollback point.
        let ticket = match self.cache.apply_optimistic(item_id, predict_toggle) {
            Optimistic::Applied(ticket) => ticket,
            Optimistic::AlreadyInFlight => {
                debug!("toggle rejected: already in flight");
                return ToggleOutcome::Rejected(RejectReason::InFlight);
            }
            Optimistic::Untracked => {
                debug!("toggle rejected: item not cached");
                return ToggleOutcome::Rejected(RejectReason::UnknownItem);
            }
        };
        let (prior_count, prior_liked) = ticket.prior();

        let result = match tokio::time::timeout(
            self.config.toggle_timeout,
            self.authority.toggle_like(item_id, user_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngagementError::Timeout(self.config.toggle_timeout)),
        };

        match result {
            Ok(response) => {
                match self.cache.reconcile(
                    &ticket,
                    response.new_like_count,
                    response.viewer_now_likes,
                ) {
                    Settle::Applied => ToggleOutcome::Reconciled {
                        like_count: response.new_like_count,
                        viewer_has_liked: response.viewer_now_likes,
                    },
                    Settle::Stale | Settle::Untracked => ToggleOutcome::Discarded,
                }
            }
            Err(e) => {
                let notice = FailureNotice::from_error(&e);
                warn!(error = %e, notice = notice.message(), "toggle failed, rolling back");
                match self.cache.rollback(&ticket, prior_count, prior_liked) {
                    Settle::Applied => ToggleOutcome::RolledBack { notice },
                    Settle::Stale | Settle::Untracked => ToggleOutcome::Discarded,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Notify;

    use crate::{Item, ToggleResponse, UserId};

    /// Authority double that replays scripted results and counts calls.
    #[derive(Default)]
    struct ScriptedAuthority {
        script: Mutex<VecDeque<Result<ToggleResponse, EngagementError>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedAuthority {
        fn with(results: Vec<Result<ToggleResponse, EngagementError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(results.into()),
                ..Default::default()
            })
        }

        fn gated(
            results: Vec<Result<ToggleResponse, EngagementError>>,
            gate: Arc<Notify>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(results.into()),
                gate: Some(gate),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToggleAuthority for ScriptedAuthority {
        async fn toggle_like(
            &self,
            _item_id: &ItemId,
            _user_id: &UserId,
        ) -> Result<ToggleResponse, EngagementError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngagementError::Transient("script exhausted".into())))
        }
    }

    fn ok(new_like_count: u64, viewer_now_likes: bool) -> Result<ToggleResponse, EngagementError> {
        Ok(ToggleResponse {
            new_like_count,
            viewer_now_likes,
        })
    }

    fn cache_with(count: u64, liked_by_alice: bool) -> Arc<EngagementCache> {
        let mut item = Item::new("m1", "owner", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        for i in 0..count {
            let user = if liked_by_alice && i == 0 {
                UserId::from("alice")
            } else {
                UserId::from(format!("user{}", i))
            };
            item.liker_ids.insert(user);
        }
        item.like_count = count;

        let cache = EngagementCache::new();
        cache.load(vec![item], &Viewer::user("alice"));
        cache
    }

    fn m1() -> ItemId {
        ItemId::from("m1")
    }

    #[tokio::test]
    async fn test_like_reconciles() {
        let cache = cache_with(5, false);
        let authority = ScriptedAuthority::with(vec![ok(6, true)]);
        let controller = ToggleController::new(Arc::clone(&cache), Arc::clone(&authority));

        let outcome = controller.request_toggle(&m1(), &Viewer::user("alice")).await;

        assert_eq!(
            outcome,
            ToggleOutcome::Reconciled {
                like_count: 6,
                viewer_has_liked: true
            }
        );
        let entry = cache.get(&m1()).unwrap();
        assert_eq!(entry.engagement(), (6, true));
        assert!(!entry.in_flight());
    }

    #[tokio::test]
    async fn test_failure_rolls_back() {
        let cache = cache_with(5, false);
        let authority =
            ScriptedAuthority::with(vec![Err(EngagementError::Transient("db down".into()))]);
        let controller = ToggleController::new(Arc::clone(&cache), Arc::clone(&authority));

        let outcome = controller.request_toggle(&m1(), &Viewer::user("alice")).await;

        assert_eq!(
            outcome,
            ToggleOutcome::RolledBack {
                notice: FailureNotice::TryAgain
            }
        );
        assert_eq!(cache.get(&m1()).unwrap().engagement(), (5, false));
        assert!(!cache.is_in_flight(&m1()));
        // Never retried
        assert_eq!(authority.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_notices_by_kind() {
        let cases = vec![
            (
                EngagementError::Unauthorized("expired".into()),
                FailureNotice::SignInAgain,
            ),
            (EngagementError::NotFound(m1()), FailureNotice::ItemGone),
            (
                EngagementError::InvalidResponse("bad body".into()),
                FailureNotice::TryAgain,
            ),
        ];

        for (err, expected) in cases {
            let cache = cache_with(3, true);
            let authority = ScriptedAuthority::with(vec![Err(err)]);
            let controller = ToggleController::new(Arc::clone(&cache), authority);

            let outcome = controller.request_toggle(&m1(), &Viewer::user("alice")).await;
            assert_eq!(outcome, ToggleOutcome::RolledBack { notice: expected });
            assert_eq!(cache.get(&m1()).unwrap().engagement(), (3, true));
        }
    }

    #[tokio::test]
    async fn test_anonymous_rejected_without_call() {
        let cache = cache_with(5, false);
        let authority = ScriptedAuthority::with(vec![ok(6, true)]);
        let controller = ToggleController::new(Arc::clone(&cache), Arc::clone(&authority));
        let before = cache.get(&m1()).unwrap();

        let outcome = controller.request_toggle(&m1(), &Viewer::Anonymous).await;

        assert_eq!(outcome, ToggleOutcome::Rejected(RejectReason::Anonymous));
        assert_eq!(cache.get(&m1()).unwrap(), before);
        assert_eq!(authority.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_item_rejected_without_call() {
        let cache = cache_with(5, false);
        let authority = ScriptedAuthority::with(vec![ok(1, true)]);
        let controller = ToggleController::new(cache, Arc::clone(&authority));

        let outcome = controller
            .request_toggle(&ItemId::from("ghost"), &Viewer::user("alice"))
            .await;

        assert_eq!(outcome, ToggleOutcome::Rejected(RejectReason::UnknownItem));
        assert_eq!(authority.calls(), 0);
    }

    #[tokio::test]
    async fn test_unlike_predicts_decrement() {
        let cache = cache_with(1, true);
        let gate = Arc::new(Notify::new());
        let authority = ScriptedAuthority::gated(vec![ok(0, false)], Arc::clone(&gate));
        let controller = Arc::new(ToggleController::new(Arc::clone(&cache), authority));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_toggle(&m1(), &Viewer::user("alice")).await })
        };
        while !cache.is_in_flight(&m1()) {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.get(&m1()).unwrap().engagement(), (0, false));
        gate.notify_one();
        assert_eq!(
            task.await.unwrap(),
            ToggleOutcome::Reconciled {
                like_count: 0,
                viewer_has_liked: false
            }
        );
    }

    #[tokio::test]
    async fn test_decrement_floored_at_zero() {
        // Inconsistent snapshot: liked but zero count
        let cache = cache_with(0, false);
        let ticket = match cache.apply_optimistic(&m1(), |_, _| (0, true)) {
            Optimistic::Applied(t) => t,
            other => panic!("unexpected {:?}", other),
        };
        cache.reconcile(&ticket, 0, true);

        let gate = Arc::new(Notify::new());
        let authority = ScriptedAuthority::gated(vec![ok(0, false)], Arc::clone(&gate));
        let controller = Arc::new(ToggleController::new(Arc::clone(&cache), authority));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_toggle(&m1(), &Viewer::user("alice")).await })
        };
        while !cache.is_in_flight(&m1()) {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.get(&m1()).unwrap().engagement(), (0, false));

        gate.notify_one();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_request_while_pending_is_rejected() {
        let cache = cache_with(5, false);
        let gate = Arc::new(Notify::new());
        let authority = ScriptedAuthority::gated(vec![ok(6, true)], Arc::clone(&gate));
        let controller = Arc::new(ToggleController::new(
            Arc::clone(&cache),
            Arc::clone(&authority),
        ));

        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_toggle(&m1(), &Viewer::user("alice")).await })
        };
        while !cache.is_in_flight(&m1()) {
            tokio::task::yield_now().await;
        }

        let optimistic = cache.get(&m1()).unwrap();
        assert_eq!(optimistic.engagement(), (6, true));

        let second = controller.request_toggle(&m1(), &Viewer::user("alice")).await;
        assert_eq!(second, ToggleOutcome::Rejected(RejectReason::InFlight));
        assert_eq!(cache.get(&m1()).unwrap(), optimistic);

        gate.notify_one();
        first.await.unwrap();
        assert_eq!(authority.calls(), 1);
        assert_eq!(cache.get(&m1()).unwrap().engagement(), (6, true));
    }

    #[test]
    fn test_predict_toggle() {
        assert_eq!(predict_toggle(5, false), (6, true));
        assert_eq!(predict_toggle(6, true), (5, false));
        assert_eq!(predict_toggle(0, true), (0, false));
    }

    #[tokio::test]
    async fn test_rollback_restores_row_present_at_apply_time() {
        let cache = cache_with(5, false);
        // Reload with newer counts right before the user acts
        cache.load(
            vec![{
                let mut item =
                    Item::new("m1", "owner", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
                item.liker_ids = ["alice", "u1", "u2", "u3", "u4", "u5", "u6"]
                    .into_iter()
                    .map(UserId::from)
                    .collect();
                item.like_count = 7;
                item
            }],
            &Viewer::user("alice"),
        );
        let authority =
            ScriptedAuthority::with(vec![Err(EngagementError::Transient("db down".into()))]);
        let controller = ToggleController::new(Arc::clone(&cache), authority);

        let outcome = controller.request_toggle(&m1(), &Viewer::user("alice")).await;

        assert_eq!(
            outcome,
            ToggleOutcome::RolledBack {
                notice: FailureNotice::TryAgain
            }
        );
        assert_eq!(cache.get(&m1()).unwrap().engagement(), (7, true));
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_original() {
        let cache = cache_with(5, false);
        let authority = ScriptedAuthority::with(vec![ok(6, true), ok(5, false)]);
        let controller = ToggleController::new(Arc::clone(&cache), authority);
        let viewer = Viewer::user("alice");

        controller.request_toggle(&m1(), &viewer).await;
        controller.request_toggle(&m1(), &viewer).await;

        assert_eq!(cache.get(&m1()).unwrap().engagement(), (5, false));
    }

    #[tokio::test]
    async fn test_authority_values_win_over_prediction() {
        // Another session of the same user already liked it
        let cache = cache_with(5, false);
        let authority = ScriptedAuthority::with(vec![ok(5, false)]);
        let controller = ToggleController::new(Arc::clone(&cache), authority);

        controller.request_toggle(&m1(), &Viewer::user("alice")).await;

        assert_eq!(cache.get(&m1()).unwrap().engagement(), (5, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let cache = cache_with(5, false);
        // Gate is never opened
        let authority = ScriptedAuthority::gated(vec![ok(6, true)], Arc::new(Notify::new()));
        let controller = ToggleController::with_config(
            Arc::clone(&cache),
            Arc::clone(&authority),
            ControllerConfig {
                toggle_timeout: Duration::from_millis(200),
            },
        );

        let outcome = controller.request_toggle(&m1(), &Viewer::user("alice")).await;

        assert_eq!(
            outcome,
            ToggleOutcome::RolledBack {
                notice: FailureNotice::TryAgain
            }
        );
        assert_eq!(cache.get(&m1()).unwrap().engagement(), (5, false));
        assert_eq!(authority.calls(), 1);
    }

    #[tokio::test]
    async fn test_reload_while_pending_discards_response() {
        let cache = cache_with(5, false);
        let gate = Arc::new(Notify::new());
        let authority = ScriptedAuthority::gated(vec![ok(6, true)], Arc::clone(&gate));
        let controller = Arc::new(ToggleController::new(Arc::clone(&cache), authority));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_toggle(&m1(), &Viewer::user("alice")).await })
        };
        while !cache.is_in_flight(&m1()) {
            tokio::task::yield_now().await;
        }

        // Sign-out style reload under a different viewer
        let item = Item::new("m1", "owner", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        cache.load(vec![item], &Viewer::Anonymous);

        gate.notify_one();
        assert_eq!(task.await.unwrap(), ToggleOutcome::Discarded);
        assert_eq!(cache.get(&m1()).unwrap().engagement(), (0, false));
    }

    #[tokio::test]
    async fn test_different_items_are_independent() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let cache = EngagementCache::new();
        cache.load(
            vec![Item::new("a", "owner", now), Item::new("b", "owner", now)],
            &Viewer::user("alice"),
        );

        let gate = Arc::new(Notify::new());
        let authority = ScriptedAuthority::gated(vec![ok(1, true), ok(1, true)], Arc::clone(&gate));
        let controller = Arc::new(ToggleController::new(
            Arc::clone(&cache),
            Arc::clone(&authority),
        ));

        let spawn_toggle = |id: &'static str| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                controller
                    .request_toggle(&ItemId::from(id), &Viewer::user("alice"))
                    .await
            })
        };
        let a = spawn_toggle("a");
        let b = spawn_toggle("b");

        while !(cache.is_in_flight(&"a".into()) && cache.is_in_flight(&"b".into())) {
            tokio::task::yield_now().await;
        }
        while authority.calls() < 2 {
            tokio::task::yield_now().await;
        }

        gate.notify_waiters();
        assert!(matches!(a.await.unwrap(), ToggleOutcome::Reconciled { .. }));
        assert!(matches!(b.await.unwrap(), ToggleOutcome::Reconciled { .. }));
        assert_eq!(authority.calls(), 2);
    }
}

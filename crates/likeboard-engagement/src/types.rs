//! Core types shared by the client, the cache and the authority.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identity of a likeable item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Resolved identity of a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An item as listed by the authority.
///
/// `liker_ids` is a set, so a user can never be counted twice. The authority
/// keeps `like_count == liker_ids.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: ItemId,
    pub like_count: u64,
    #[serde(default)]
    pub liker_ids: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub owner_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Item {
    /// Create an item with no likes.
    pub fn new(
        item_id: impl Into<ItemId>,
        owner_id: impl Into<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            like_count: 0,
            liker_ids: BTreeSet::new(),
            created_at,
            owner_id: owner_id.into(),
            caption: None,
            image_url: None,
        }
    }

    /// Whether the given user is in the liker set.
    pub fn is_liked_by(&self, user_id: &UserId) -> bool {
        self.liker_ids.contains(user_id)
    }
}

/// Who is looking at the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Viewer {
    /// No resolved identity. Cannot toggle.
    #[default]
    Anonymous,
    /// Signed-in user.
    User(UserId),
}

impl Viewer {
    /// Convenience constructor for a signed-in viewer.
    pub fn user(id: impl Into<UserId>) -> Self {
        Viewer::User(id.into())
    }

    /// The viewer's identity, if resolved.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(id),
        }
    }

    /// Whether this viewer owns the given item.
    pub fn owns(&self, owner_id: &UserId) -> bool {
        self.user_id() == Some(owner_id)
    }

    /// Whether `viewer_has_liked` holds for this viewer on `item`.
    pub fn has_liked(&self, item: &Item) -> bool {
        self.user_id().is_some_and(|id| item.is_liked_by(id))
    }
}

/// Per-item toggle phase as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TogglePhase {
    /// No toggle outstanding.
    #[default]
    Idle,
    /// Optimistic values applied, authority call outstanding. `ticket`
    /// identifies the toggle that may settle this entry.
    Pending { ticket: u64 },
}

/// A cache row: the viewer-specific engagement state of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementEntry {
    pub item_id: ItemId,
    pub like_count: u64,
    pub viewer_has_liked: bool,
    pub phase: TogglePhase,
    pub created_at: DateTime<Utc>,
    pub owner_id: UserId,
    pub caption: Option<String>,
    pub image_url: Option<String>,
}

impl EngagementEntry {
    /// Build an entry from an authority item, deriving the like flag from
    /// liker-set membership.
    pub fn from_item(item: Item, viewer: &Viewer) -> Self {
        let viewer_has_liked = viewer.has_liked(&item);
        Self {
            item_id: item.item_id,
            like_count: item.like_count,
            viewer_has_liked,
            phase: TogglePhase::Idle,
            created_at: item.created_at,
            owner_id: item.owner_id,
            caption: item.caption,
            image_url: item.image_url,
        }
    }

    /// A toggle for this item is outstanding.
    pub fn in_flight(&self) -> bool {
        matches!(self.phase, TogglePhase::Pending { .. })
    }

    /// The `(like_count, viewer_has_liked)` pair used for snapshots.
    pub fn engagement(&self) -> (u64, bool) {
        (self.like_count, self.viewer_has_liked)
    }
}

/// Authority response to a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub new_like_count: u64,
    pub viewer_now_likes: bool,
}

/// Response body of `GET /api/items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItemsResponse {
    pub items: Vec<Item>,
}

/// Response body of `GET /api/whoami`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub user_id: UserId,
}

/// Error body returned by the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

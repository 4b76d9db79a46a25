//! Client-side engagement state for likeboard.
//!
//! This crate keeps every view of a session consistent with the like
//! authority while toggles are applied optimistically.
//!
//! ## Features
//!
//! - **Cache**: Thread-safe in-memory engagement cache with update broadcasts
//! - **Controller**: Optimistic toggle, reconcile on success, rollback on failure
//! - **Ranking**: Deterministic top-N leaderboard over a cache snapshot
//! - **HTTP Client**: Client for the authority's JSON API
//! - **Session**: Viewer identity, reloads, and the feed/leaderboard/detail views

mod authority;
pub mod cache;
mod client;
pub mod controller;
mod error;
pub mod ranking;
pub mod session;
mod types;
pub mod views;

pub use authority::{ItemSource, ToggleAuthority};
pub use cache::{CacheUpdate, EngagementCache, Optimistic, Settle, Ticket};
pub use client::{AuthorityClient, ClientConfig};
pub use controller::{
    ControllerConfig, DEFAULT_TOGGLE_TIMEOUT, FailureNotice, RejectReason, ToggleController,
    ToggleOutcome,
};
pub use error::{EngagementError, ErrorKind};
pub use ranking::{DEFAULT_LEADERBOARD_SIZE, compare_entries, rank_entries, top_n};
pub use session::EngagementSession;
pub use types::*;
pub use views::{DetailView, FeedView, ItemRow, LeaderboardView, RankedRow, format_age};

//! Authoritative like store and HTTP API for likeboard.
//!
//! This crate owns the liker sets. It provides:
//! - A [`LikeStore`] trait with in-memory and SQLite implementations
//! - Bearer-token identity resolution
//! - The axum router clients talk to

mod auth;
mod error;
mod routes;
pub mod store;

pub use auth::{AuthenticatedUser, IdentityResolver, TokenTable};
pub use error::AuthorityError;
pub use routes::{AppState, create_router};
pub use store::{LikeStore, MemoryStore, SqliteStore, seed_from_json};

//! HTTP boundary for the aggregation layer.
//!
//! Thin axum routes over the gateway router, the OAuth token manager,
//! and the leaderboard refresher. Handlers validate input shape and map
//! the shared error taxonomy onto HTTP statuses; all protocol logic
//! lives below this crate.

pub mod handlers;
pub mod server;

pub use server::{ApiServer, AppState, SessionTokens};

//! Skill scoring and leaderboard ranking.
//!
//! Scores are recomputed idempotently from the current trade snapshot;
//! nothing here mutates state outside its own refresh cycle. Banding,
//! reliability weighting, and ranking are pure functions so the same
//! inputs always produce the same board.

pub mod elo;
pub mod leaderboard;
pub mod refresher;

pub use elo::{aggregate_profile, score, EloCategory, EloResult, Reliability, BASELINE_SCORE};
pub use leaderboard::{podium, rank, LeaderboardEntry};
pub use refresher::{LeaderboardRefresher, ProfileSource};

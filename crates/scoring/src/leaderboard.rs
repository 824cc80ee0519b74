//! Leaderboard ranking projections.

use crate::elo::{score, EloResult};
use serde::{Deserialize, Serialize};
use tradeboard_core::TraderProfile;

/// One ranked row. Rank is derived from the sort, never stored
/// independently of the source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: u32,
    pub trader_profile_id: String,
    pub nickname: String,
    pub elo_result: EloResult,
    pub win_rate: f64,
}

/// Ranks profiles by descending rating.
///
/// Ties break on higher trade count, then ascending profile id so the
/// ordering is total and re-ranking an unchanged input is a no-op.
#[must_use]
pub fn rank(profiles: &[TraderProfile]) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&TraderProfile> = profiles.iter().collect();
    sorted.sort_by(|a, b| {
        b.elo_score
            .total_cmp(&a.elo_score)
            .then_with(|| b.total_trades.cmp(&a.total_trades))
            .then_with(|| a.id.cmp(&b.id))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, profile)| LeaderboardEntry {
            rank: i as u32 + 1,
            trader_profile_id: profile.id.clone(),
            nickname: profile.nickname.clone(),
            elo_result: score(profile, &[]),
            win_rate: profile.win_rate,
        })
        .collect()
}

/// Top three rows of a ranked board.
#[must_use]
pub fn podium(entries: &[LeaderboardEntry]) -> &[LeaderboardEntry] {
    &entries[..entries.len().min(3)]
}

// =============================================================================
// Tests
// =============================================================================

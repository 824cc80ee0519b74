//! ELO-style rating, category banding, and reliability weighting.
//!
//! The rating itself is persisted by the storage collaborator; this
//! module derives everything else from it and from the trade snapshot.
//! Scoring is a pure function: recomputing over the same snapshot
//! always yields the same result.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tradeboard_core::{TradeRecord, TraderProfile};

/// Rating assigned to a trader with no recorded score.
pub const BASELINE_SCORE: f64 = 1000.0;

// =============================================================================
// Category banding
// =============================================================================

/// Qualitative skill band. Ordered from weakest to strongest; each band
/// is an inclusive lower bound and the highest matching band wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EloCategory {
    Beginner,
    Intermediate,
    Developing,
    Unstable,
    Consistent,
    Professional,
    Elite,
}

impl EloCategory {
    /// Bands a score. Lower bounds are inclusive.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 3500.0 {
            Self::Elite
        } else if score >= 3000.0 {
            Self::Professional
        } else if score >= 2500.0 {
            Self::Consistent
        } else if score >= 2200.0 {
            Self::Unstable
        } else if score >= 1800.0 {
            Self::Developing
        } else if score >= 1400.0 {
            Self::Intermediate
        } else {
            Self::Beginner
        }
    }

    /// Display name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Developing => "Developing",
            Self::Unstable => "Unstable",
            Self::Consistent => "Consistent",
            Self::Professional => "Professional",
            Self::Elite => "Elite",
        }
    }

    /// Fixed display color for the band, independent of exact score.
    #[must_use]
    pub fn color(&self) -> &'static str {
        match self {
            Self::Beginner => "#9E9E9E",
            Self::Intermediate => "#8D6E63",
            Self::Developing => "#26A69A",
            Self::Unstable => "#FFA726",
            Self::Consistent => "#42A5F5",
            Self::Professional => "#AB47BC",
            Self::Elite => "#FFD700",
        }
    }
}

impl std::fmt::Display for EloCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reliability
// =============================================================================

/// How much a score should be trusted given the sample size.
///
/// Both coefficients are monotonic in the trade count: confidence
/// saturates smoothly around the half-life of 30 trades, coverage
/// reaches 1.0 at 100 recorded trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reliability {
    pub total_trades: u64,
    /// `n / (n + 30)`, in `[0, 1)`.
    pub confidence_coefficient: f64,
    /// `min(n / 100, 1)`, in `[0, 1]`.
    pub data_coverage: f64,
    /// `0.5 + 0.5 * confidence`, in `[0.5, 1)`.
    pub reliability_multiplier: f64,
}

/// Trade count at which confidence reaches one half.
const CONFIDENCE_HALF_LIFE: f64 = 30.0;

/// Trade count treated as full data coverage.
const FULL_COVERAGE_TRADES: f64 = 100.0;

impl Reliability {
    /// Computes the reliability figures for a trade count.
    #[must_use]
    pub fn from_trade_count(total_trades: u64) -> Self {
        let n = total_trades as f64;
        let confidence_coefficient = n / (n + CONFIDENCE_HALF_LIFE);
        let data_coverage = (n / FULL_COVERAGE_TRADES).min(1.0);

        Self {
            total_trades,
            confidence_coefficient,
            data_coverage,
            reliability_multiplier: 0.5 + 0.5 * confidence_coefficient,
        }
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// Derived rating for one trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EloResult {
    /// Display score, clamped non-negative.
    pub elo_score: f64,
    /// Persisted score, or the baseline when none is recorded.
    pub raw_score: f64,
    pub category: EloCategory,
    /// Band color, carried so the wire shape is self-contained.
    pub color: String,
    pub reliability: Reliability,
}

/// Scores a trader from the persisted rating and the trade snapshot.
///
/// A missing or non-positive persisted rating is treated as the
/// baseline. Banding applies to the score itself; reliability is
/// reported alongside so callers can weight the display. The sample
/// size behind reliability is the larger of the profile's recorded
/// trade count and the snapshot length, so callers ranking from
/// persisted profiles alone still report the real sample.
#[must_use]
pub fn score(profile: &TraderProfile, trades: &[TradeRecord]) -> EloResult {
    let raw_score = if profile.elo_score > 0.0 {
        profile.elo_score
    } else {
        BASELINE_SCORE
    };
    let elo_score = raw_score.max(0.0);
    let category = EloCategory::from_score(elo_score);
    let sample = profile.total_trades.max(trades.len() as u64);

    EloResult {
        elo_score,
        raw_score,
        category,
        color: category.color().to_string(),
        reliability: Reliability::from_trade_count(sample),
    }
}

/// Recomputes a profile's aggregate stats from a trade snapshot.
///
/// `total_trades` and `win_rate` are overwritten wholesale; a trade
/// counts as a win when its net profit is strictly positive.
#[must_use]
pub fn aggregate_profile(mut profile: TraderProfile, trades: &[TradeRecord]) -> TraderProfile {
    profile.total_trades = trades.len() as u64;
    profile.win_rate = if trades.is_empty() {
        0.0
    } else {
        let wins = trades.iter().filter(|t| t.is_win()).count();
        wins as f64 / trades.len() as f64 * 100.0
    };
    profile.updated_at = Utc::now();
    profile
}

// =============================================================================
// Tests
// =============================================================================

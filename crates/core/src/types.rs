//! Canonical data model shared by all exchange integrations.
//!
//! Raw provider payloads are normalized into [`TradeRecord`] by the
//! per-exchange crates; everything downstream (scoring, leaderboard,
//! HTTP boundary) only ever sees these shapes.

use crate::error::{ExchangeError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Platform
// =============================================================================

/// Supported trading platforms.
///
/// `Mt5` has no public read API and is served by the stub gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Binance,
    Bybit,
    Ctrader,
    Mt5,
}

impl Platform {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Bybit => "bybit",
            Self::Ctrader => "ctrader",
            Self::Mt5 => "mt5",
        }
    }

    /// Returns the prefix used for this platform's environment variables.
    #[must_use]
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Binance => "BINANCE",
            Self::Bybit => "BYBIT",
            Self::Ctrader => "CTRADER",
            Self::Mt5 => "MT5",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "bybit" => Ok(Self::Bybit),
            "ctrader" => Ok(Self::Ctrader),
            "mt5" => Ok(Self::Mt5),
            other => Err(ExchangeError::unsupported_platform(other)),
        }
    }
}

// =============================================================================
// AccountMode
// =============================================================================

/// Live vs demo account environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    Live,
    Demo,
}

impl AccountMode {
    /// Returns the lowercase name used in request bodies.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Demo => "demo",
        }
    }

    /// Returns the uppercase infix used in environment variable names.
    #[must_use]
    pub fn env_infix(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Demo => "DEMO",
        }
    }
}

impl FromStr for AccountMode {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "demo" => Ok(Self::Demo),
            other => Err(ExchangeError::Configuration(format!(
                "unknown account mode: {other}"
            ))),
        }
    }
}

// =============================================================================
// TradeRecord
// =============================================================================

/// Direction of a canonical trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// One normalized trade in the canonical schema.
///
/// Immutable once written; corrective re-syncs replace records wholesale
/// rather than mutating them in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unique record id (provider id where stable, otherwise generated).
    pub id: String,
    /// Owning trader profile.
    pub trader_profile_id: String,
    /// Instrument symbol as reported by the provider.
    pub symbol: String,
    /// Buy or sell.
    pub direction: TradeDirection,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Average exit price, when the provider reports one.
    pub exit_price: Option<Decimal>,
    /// Traded volume. Never negative.
    pub volume: Decimal,
    /// Realized profit net of fees. Zero for raw fills without P&L.
    pub net_profit: Decimal,
    /// Commission paid.
    pub commission: Decimal,
    /// Open timestamp, when known.
    pub open_time: Option<DateTime<Utc>>,
    /// Close timestamp, when known.
    pub close_time: Option<DateTime<Utc>>,
    /// Platform the trade came from.
    pub platform: Platform,
}

impl TradeRecord {
    /// Checks the schema invariants: non-negative volume and
    /// `close_time >= open_time` when both are present.
    ///
    /// # Errors
    /// Returns `ExchangeError::Validation` naming the violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.volume < Decimal::ZERO {
            return Err(ExchangeError::Validation(format!(
                "trade {}: negative volume {}",
                self.id, self.volume
            )));
        }
        if let (Some(open), Some(close)) = (self.open_time, self.close_time) {
            if close < open {
                return Err(ExchangeError::Validation(format!(
                    "trade {}: close_time {} precedes open_time {}",
                    self.id, close, open
                )));
            }
        }
        Ok(())
    }

    /// Returns true when this trade closed with a positive net profit.
    #[must_use]
    pub fn is_win(&self) -> bool {
        self.net_profit > Decimal::ZERO
    }
}

// =============================================================================
// TraderProfile
// =============================================================================

/// Aggregated stats for one trader.
///
/// Recomputed idempotently from the current trade set on every scoring
/// pass; it has no independent mutation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderProfile {
    pub id: String,
    pub nickname: String,
    pub broker: String,
    pub is_live_account: bool,
    /// Total recorded trades. Never negative.
    pub total_trades: u64,
    /// Winning trades as a percentage in `[0, 100]`.
    pub win_rate: f64,
    /// Persisted ELO-style rating. Non-negative.
    pub elo_score: f64,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Normalization output
// =============================================================================

/// Result of normalizing one raw provider batch.
///
/// Malformed individual records are skipped rather than failing the
/// batch; `skipped` reports how many were dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedBatch {
    pub trades: Vec<TradeRecord>,
    pub skipped: usize,
}

impl NormalizedBatch {
    /// Merges another batch into this one. Ordering across batches is
    /// unspecified.
    pub fn merge(&mut self, other: NormalizedBatch) {
        self.trades.extend(other.trades);
        self.skipped += other.skipped;
    }
}

// =============================================================================
// Gateway call shapes
// =============================================================================

/// Parameters for a trade-history fetch through a gateway.
#[derive(Debug, Clone)]
pub struct TradeQuery {
    /// Profile the normalized trades will be attributed to.
    pub trader_profile_id: String,
    /// Optional symbol filter.
    pub symbol: Option<String>,
    /// Live or demo credentials.
    pub mode: AccountMode,
    /// Per-request credential, overriding the environment chain.
    pub credential: Option<crate::credential::RequestCredential>,
}

impl TradeQuery {
    /// Creates a query for the given profile with defaults (live mode,
    /// no symbol filter, environment credentials).
    #[must_use]
    pub fn for_profile(trader_profile_id: impl Into<String>) -> Self {
        Self {
            trader_profile_id: trader_profile_id.into(),
            symbol: None,
            mode: AccountMode::Live,
            credential: None,
        }
    }

    /// Sets the symbol filter.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Sets the account mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AccountMode) -> Self {
        self.mode = mode;
        self
    }

    /// Supplies an explicit per-request credential.
    #[must_use]
    pub fn with_credential(mut self, credential: crate::credential::RequestCredential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Upstream status and body forwarded verbatim by the proxy path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: String,
}

// =============================================================================
// Tests
// =============================================================================

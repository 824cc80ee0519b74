//! Maps raw cTrader deal payloads into canonical trades.
//!
//! Only deals that close a position carry realized P&L; opening deals
//! are ignored. Monetary amounts arrive as integer cents and are scaled
//! to decimal units here. Malformed records are skipped individually
//! and counted rather than failing the batch.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tradeboard_core::{NormalizedBatch, Platform, TradeDirection, TradeRecord};

/// Position-closing detail attached to a closing deal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCloseDetail {
    pub entry_price: Option<Decimal>,
    /// Realized gross profit in cents.
    pub gross_profit: Option<i64>,
    /// Commission in cents, usually negative.
    pub commission: Option<i64>,
}

/// One deal as returned by the deal-history endpoint.
///
/// Every non-identifying field is optional: upstream schema drift must
/// not break deserialization of the whole batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeal {
    pub deal_id: i64,
    pub symbol_name: Option<String>,
    pub trade_side: Option<String>,
    /// Filled volume in cents of a unit.
    pub filled_volume: Option<i64>,
    pub execution_price: Option<Decimal>,
    pub create_timestamp: Option<i64>,
    pub execution_timestamp: Option<i64>,
    pub close_position_detail: Option<RawCloseDetail>,
}

/// Scales an integer cents amount into decimal units.
fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

/// Normalizes a batch of raw deals for one trader profile.
///
/// Deals without a close-position detail are ignored (not counted as
/// skips); records that fail to parse or violate the canonical
/// invariants are skipped with a warning and counted.
#[must_use]
pub fn normalize_deals(trader_profile_id: &str, deals: Vec<RawDeal>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in deals {
        if raw.close_position_detail.is_none() {
            continue;
        }
        match map_deal(trader_profile_id, raw) {
            Ok(trade) => batch.trades.push(trade),
            Err(reason) => {
                tracing::warn!(platform = "ctrader", %reason, "skipping malformed deal");
                batch.skipped += 1;
            }
        }
    }

    batch
}

fn map_deal(trader_profile_id: &str, raw: RawDeal) -> Result<TradeRecord, String> {
    let detail = raw
        .close_position_detail
        .ok_or_else(|| format!("deal {}: missing close detail", raw.deal_id))?;

    let direction = match raw.trade_side.as_deref() {
        Some("BUY") => TradeDirection::Buy,
        Some("SELL") => TradeDirection::Sell,
        other => return Err(format!("deal {}: unknown side {other:?}", raw.deal_id)),
    };

    let symbol = raw
        .symbol_name
        .ok_or_else(|| format!("deal {}: missing symbol", raw.deal_id))?;

    let entry_price = detail
        .entry_price
        .ok_or_else(|| format!("deal {}: missing entry price", raw.deal_id))?;

    let volume = raw
        .filled_volume
        .map(cents)
        .ok_or_else(|| format!("deal {}: missing volume", raw.deal_id))?;

    let net_profit = detail
        .gross_profit
        .map(cents)
        .ok_or_else(|| format!("deal {}: missing gross profit", raw.deal_id))?;

    let trade = TradeRecord {
        id: format!("ctrader-{}", raw.deal_id),
        trader_profile_id: trader_profile_id.to_string(),
        symbol,
        direction,
        entry_price,
        exit_price: raw.execution_price,
        volume,
        net_profit,
        commission: detail.commission.map(cents).unwrap_or(Decimal::ZERO),
        open_time: raw.create_timestamp.and_then(ms_to_datetime),
        close_time: raw.execution_timestamp.and_then(ms_to_datetime),
        platform: Platform::Ctrader,
    };

    trade.validate().map_err(|e| e.to_string())?;
    Ok(trade)
}

fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// =============================================================================
// Tests
// =============================================================================

//! Maps raw Bybit closed-PnL payloads into canonical trades.
//!
//! Bybit v5 returns every numeric field as a string; each record is
//! parsed into a strict intermediate struct before conversion so
//! upstream schema drift never reaches the canonical schema. Malformed
//! records are skipped individually and counted.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tradeboard_core::{NormalizedBatch, Platform, TradeDirection, TradeRecord};

/// One record from `GET /v5/position/closed-pnl`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClosedPnl {
    pub symbol: String,
    pub order_id: Option<String>,
    pub side: Option<String>,
    pub qty: Option<String>,
    pub avg_entry_price: Option<String>,
    pub avg_exit_price: Option<String>,
    pub closed_pnl: Option<String>,
    pub cum_entry_value: Option<String>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

/// Envelope for the closed-PnL list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClosedPnlResult {
    pub list: Option<Vec<RawClosedPnl>>,
}

/// Normalizes a batch of closed-PnL records for one trader profile.
#[must_use]
pub fn normalize_closed_pnl(
    trader_profile_id: &str,
    records: Vec<RawClosedPnl>,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in records {
        match map_record(trader_profile_id, raw) {
            Ok(trade) => batch.trades.push(trade),
            Err(reason) => {
                tracing::warn!(platform = "bybit", %reason, "skipping malformed closed-pnl record");
                batch.skipped += 1;
            }
        }
    }

    batch
}

fn map_record(trader_profile_id: &str, raw: RawClosedPnl) -> Result<TradeRecord, String> {
    let direction = match raw.side.as_deref() {
        Some("Buy") => TradeDirection::Buy,
        Some("Sell") => TradeDirection::Sell,
        other => return Err(format!("{}: unknown side {other:?}", raw.symbol)),
    };

    let entry_price = parse_decimal(raw.avg_entry_price.as_deref())
        .ok_or_else(|| format!("{}: unparseable avgEntryPrice", raw.symbol))?;
    let volume = parse_decimal(raw.qty.as_deref())
        .ok_or_else(|| format!("{}: unparseable qty", raw.symbol))?;
    let net_profit = parse_decimal(raw.closed_pnl.as_deref())
        .ok_or_else(|| format!("{}: unparseable closedPnl", raw.symbol))?;

    let id = raw
        .order_id
        .map(|oid| format!("bybit-{oid}"))
        .unwrap_or_else(|| format!("bybit-{}-{}", raw.symbol, created_suffix(&raw.created_time)));

    let trade = TradeRecord {
        id,
        trader_profile_id: trader_profile_id.to_string(),
        symbol: raw.symbol,
        direction,
        entry_price,
        exit_price: parse_decimal(raw.avg_exit_price.as_deref()),
        volume,
        net_profit,
        commission: Decimal::ZERO,
        open_time: parse_epoch_ms(raw.created_time.as_deref()),
        close_time: parse_epoch_ms(raw.updated_time.as_deref()),
        platform: Platform::Bybit,
    };

    trade.validate().map_err(|e| e.to_string())?;
    Ok(trade)
}

fn parse_decimal(value: Option<&str>) -> Option<Decimal> {
    value.and_then(|v| v.parse::<Decimal>().ok())
}

fn parse_epoch_ms(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn created_suffix(created_time: &Option<String>) -> String {
    created_time.clone().unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Tests
// =============================================================================

//! Maps raw Binance order-history payloads into canonical trades.
//!
//! Order history carries fills, not closed positions, so `net_profit`
//! defaults to zero; only `FILLED` orders map. Malformed records are
//! skipped individually and counted rather than failing the batch.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tradeboard_core::{NormalizedBatch, Platform, TradeDirection, TradeRecord};

/// One order as returned by `GET /api/v3/allOrders`.
///
/// Every non-identifying field is optional: upstream schema drift must
/// not break deserialization of the whole batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBinanceOrder {
    pub symbol: String,
    pub order_id: i64,
    pub side: Option<String>,
    pub status: Option<String>,
    pub price: Option<String>,
    pub executed_qty: Option<String>,
    pub cummulative_quote_qty: Option<String>,
    pub time: Option<i64>,
    pub update_time: Option<i64>,
}

/// Normalizes a batch of raw orders for one trader profile.
///
/// Non-`FILLED` orders are ignored (not counted as skips); records that
/// fail to parse or violate the canonical invariants are skipped with a
/// warning and counted.
#[must_use]
pub fn normalize_orders(trader_profile_id: &str, orders: Vec<RawBinanceOrder>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in orders {
        if raw.status.as_deref() != Some("FILLED") {
            continue;
        }
        match map_order(trader_profile_id, raw) {
            Ok(trade) => batch.trades.push(trade),
            Err(reason) => {
                tracing::warn!(platform = "binance", %reason, "skipping malformed order");
                batch.skipped += 1;
            }
        }
    }

    batch
}

fn map_order(trader_profile_id: &str, raw: RawBinanceOrder) -> Result<TradeRecord, String> {
    let direction = match raw.side.as_deref() {
        Some("BUY") => TradeDirection::Buy,
        Some("SELL") => TradeDirection::Sell,
        other => return Err(format!("order {}: unknown side {other:?}", raw.order_id)),
    };

    let volume = parse_decimal(raw.executed_qty.as_deref())
        .ok_or_else(|| format!("order {}: unparseable executedQty", raw.order_id))?;

    // Listed price can be zero for market orders; fall back to the
    // average fill price derived from the quote volume.
    let mut entry_price = parse_decimal(raw.price.as_deref()).unwrap_or(Decimal::ZERO);
    if entry_price.is_zero() && !volume.is_zero() {
        if let Some(quote) = parse_decimal(raw.cummulative_quote_qty.as_deref()) {
            entry_price = quote / volume;
        }
    }

    let trade = TradeRecord {
        id: format!("binance-{}", raw.order_id),
        trader_profile_id: trader_profile_id.to_string(),
        symbol: raw.symbol,
        direction,
        entry_price,
        exit_price: None,
        volume,
        // Raw fills carry no realized P&L.
        net_profit: Decimal::ZERO,
        commission: Decimal::ZERO,
        open_time: raw.time.and_then(ms_to_datetime),
        close_time: raw.update_time.and_then(ms_to_datetime),
        platform: Platform::Binance,
    };

    trade.validate().map_err(|e| e.to_string())?;
    Ok(trade)
}

fn parse_decimal(value: Option<&str>) -> Option<Decimal> {
    value.and_then(|v| v.parse::<Decimal>().ok())
}

fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// =============================================================================
// Tests
// =============================================================================

//! Canned MT5 gateway.
//!
//! MT5 has no direct integration yet; the dashboard still lists MT5
//! accounts, so this stub serves a deterministic trade history behind
//! the same contract as the real clients. Swapping in a live client
//! later is a router registration change, nothing else.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use tradeboard_core::{
    ExchangeError, NormalizedBatch, Platform, ProxyResponse, Result, TradeDirection, TradeGateway,
    TradeQuery, TradeRecord,
};

/// Stand-in gateway serving fixed MT5 trade data.
#[derive(Debug, Default)]
pub struct Mt5StubGateway;

impl Mt5StubGateway {
    /// Creates the stub.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn canned_trades(trader_profile_id: &str) -> Vec<TradeRecord> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();

        vec![
            TradeRecord {
                id: format!("mt5-{trader_profile_id}-1"),
                trader_profile_id: trader_profile_id.to_string(),
                symbol: "EURUSD".to_string(),
                direction: TradeDirection::Buy,
                entry_price: Decimal::new(10850, 4),
                exit_price: Some(Decimal::new(10910, 4)),
                volume: Decimal::new(100, 2),
                net_profit: Decimal::new(6000, 2),
                commission: Decimal::new(-700, 2),
                open_time: Some(base),
                close_time: Some(base + Duration::hours(3)),
                platform: Platform::Mt5,
            },
            TradeRecord {
                id: format!("mt5-{trader_profile_id}-2"),
                trader_profile_id: trader_profile_id.to_string(),
                symbol: "XAUUSD".to_string(),
                direction: TradeDirection::Sell,
                entry_price: Decimal::new(202510, 2),
                exit_price: Some(Decimal::new(203120, 2)),
                volume: Decimal::new(50, 2),
                net_profit: Decimal::new(-30500, 2),
                commission: Decimal::new(-350, 2),
                open_time: Some(base + Duration::days(1)),
                close_time: Some(base + Duration::days(1) + Duration::minutes(45)),
                platform: Platform::Mt5,
            },
        ]
    }
}

#[async_trait]
impl TradeGateway for Mt5StubGateway {
    async fn fetch_trades(&self, query: &TradeQuery) -> Result<NormalizedBatch> {
        let mut trades = Self::canned_trades(&query.trader_profile_id);
        if let Some(symbol) = &query.symbol {
            trades.retain(|t| &t.symbol == symbol);
        }

        Ok(NormalizedBatch { trades, skipped: 0 })
    }

    async fn validate(&self, api_key: &str, api_secret: &str) -> Result<bool> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ExchangeError::Configuration(
                "api_key and api_secret are required".to_string(),
            ));
        }
        Ok(true)
    }

    async fn proxy(
        &self,
        endpoint: &str,
        _params: &[(String, String)],
        _query: &TradeQuery,
    ) -> Result<ProxyResponse> {
        tracing::debug!(endpoint, "serving stub proxy response");
        Ok(ProxyResponse {
            status: 200,
            body: r#"{"data":[]}"#.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

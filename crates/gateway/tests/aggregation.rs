//! End-to-end: raw provider payloads through normalization and profile
//! aggregation into one scored leaderboard row.

use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tradeboard_bybit::normalizer::normalize_closed_pnl;
use tradeboard_bybit::RawClosedPnlResult;
use tradeboard_core::{NormalizedBatch, Platform, TradeQuery, TraderProfile};
use tradeboard_gateway::{GatewayRouter, Mt5StubGateway};
use tradeboard_scoring::{aggregate_profile, rank, score, EloCategory};

fn empty_profile(id: &str) -> TraderProfile {
    TraderProfile {
        id: id.to_string(),
        nickname: format!("nick-{id}"),
        broker: "multi".to_string(),
        is_live_account: true,
        total_trades: 0,
        win_rate: 0.0,
        elo_score: 0.0,
        updated_at: Utc::now(),
    }
}

fn bybit_batch(profile_id: &str) -> NormalizedBatch {
    let result: RawClosedPnlResult = serde_json::from_value(serde_json::json!({
        "list": [{
            "symbol": "BTCUSDT",
            "orderId": "ord-1",
            "side": "Buy",
            "qty": "0.5",
            "avgEntryPrice": "50000",
            "avgExitPrice": "51000",
            "closedPnl": "495.5",
            "createdTime": "1700000000000",
            "updatedTime": "1700003600000"
        }]
    }))
    .unwrap();
    normalize_closed_pnl(profile_id, result.list.unwrap())
}

fn ctrader_batch(profile_id: &str) -> NormalizedBatch {
    let deals: Vec<tradeboard_ctrader::RawDeal> = serde_json::from_value(serde_json::json!([{
        "dealId": 9,
        "symbolName": "BTCUSDT",
        "tradeSide": "SELL",
        "filledVolume": 50,
        "executionPrice": 50200,
        "createTimestamp": 1700010000000i64,
        "executionTimestamp": 1700013600000i64,
        "closePositionDetail": {
            "entryPrice": 51000,
            "grossProfit": -12000,
            "commission": -150
        }
    }]))
    .unwrap();
    tradeboard_ctrader::normalize_deals(profile_id, deals)
}

#[test]
fn two_providers_aggregate_into_one_profile() {
    let mut batch = bybit_batch("p-1");
    batch.merge(ctrader_batch("p-1"));
    assert_eq!(batch.trades.len(), 2);
    assert_eq!(batch.skipped, 0);

    // Same symbol from both providers, one win and one loss.
    assert!(batch.trades.iter().all(|t| t.symbol == "BTCUSDT"));
    assert_ne!(batch.trades[0].platform, batch.trades[1].platform);

    let profile = aggregate_profile(empty_profile("p-1"), &batch.trades);
    assert_eq!(profile.total_trades, 2);
    assert_eq!(profile.win_rate, 50.0);

    let result = score(&profile, &batch.trades);
    assert_eq!(result.category, EloCategory::Beginner);
    assert_eq!(result.reliability.total_trades, 2);
}

#[test]
fn aggregated_profiles_rank_deterministically() {
    let mut batch = bybit_batch("p-1");
    batch.merge(ctrader_batch("p-1"));

    let mut scored = aggregate_profile(empty_profile("p-1"), &batch.trades);
    scored.elo_score = 2650.0;

    let board = rank(&[scored, empty_profile("p-2")]);
    assert_eq!(board[0].trader_profile_id, "p-1");
    assert_eq!(board[0].elo_result.category, EloCategory::Consistent);
    assert_eq!(board[1].rank, 2);
}

#[tokio::test]
async fn stub_gateway_feeds_the_same_pipeline() {
    let mut router = GatewayRouter::new();
    router.register(Platform::Mt5, Arc::new(Mt5StubGateway::new()));

    let batch = router
        .fetch_trades(Platform::Mt5, &TradeQuery::for_profile("p-9"))
        .await
        .unwrap();
    assert_eq!(batch.trades.len(), 2);

    let profile = aggregate_profile(empty_profile("p-9"), &batch.trades);
    assert_eq!(profile.total_trades, 2);
    assert_eq!(profile.win_rate, 50.0);
    assert_eq!(batch.trades[0].net_profit, dec!(60.00));
}

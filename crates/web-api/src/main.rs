//! Standalone server binary: default gateways, session token managers
//! and the periodic leaderboard refresh behind one axum listener.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tradeboard_core::{
    AccountMode, Platform, ProcessEnv, Result, TradeGateway, TradeQuery, TraderProfile,
};
use tradeboard_ctrader::{
    CtraderClient, CtraderClientConfig, InMemoryTokenStore, OAuthConfig, OAuthExchanger,
    TokenManager, TokenStore,
};
use tradeboard_gateway::{GatewayRouter, Mt5StubGateway};
use tradeboard_scoring::{aggregate_profile, LeaderboardRefresher, ProfileSource};
use tradeboard_web_api::{ApiServer, AppState, SessionTokens};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const ADDR_ENV: &str = "TRADEBOARD_ADDR";

/// Builds board profiles from the MT5 stub history until a storage
/// backed source replaces it.
struct StubProfileSource {
    gateway: Mt5StubGateway,
}

#[async_trait]
impl ProfileSource for StubProfileSource {
    async fn load_profiles(&self) -> Result<Vec<TraderProfile>> {
        let batch = self
            .gateway
            .fetch_trades(&TradeQuery::for_profile("demo-trader"))
            .await?;

        let profile = TraderProfile {
            id: "demo-trader".to_string(),
            nickname: "Demo Trader".to_string(),
            broker: "mt5".to_string(),
            is_live_account: false,
            total_trades: 0,
            win_rate: 0.0,
            elo_score: 0.0,
            updated_at: Utc::now(),
        };
        Ok(vec![aggregate_profile(profile, &batch.trades)])
    }
}

fn token_manager(store: &Arc<dyn TokenStore>, mode: AccountMode) -> Result<Arc<TokenManager>> {
    let exchanger = OAuthExchanger::new(OAuthConfig::from_env(&ProcessEnv))?;
    Ok(Arc::new(TokenManager::new(
        exchanger,
        store.clone(),
        "server",
        mode,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| DEFAULT_ADDR.to_string());

    // Both modes share one store and session; the mode only steers
    // which client credentials sign the token exchange.
    let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    let live = token_manager(&store, AccountMode::Live)?;
    let demo = token_manager(&store, AccountMode::Demo)?;

    let mut gateways = GatewayRouter::with_defaults()?;
    gateways.register(
        Platform::Ctrader,
        Arc::new(CtraderClient::new(
            CtraderClientConfig::default(),
            live.clone(),
        )?),
    );

    let state = Arc::new(AppState {
        gateways,
        tokens: SessionTokens { live, demo },
        leaderboard: Arc::new(LeaderboardRefresher::new(Arc::new(StubProfileSource {
            gateway: Mt5StubGateway::new(),
        }))),
    });

    ApiServer::new(state).serve(&addr).await
}

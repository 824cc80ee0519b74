use crate::handlers;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tradeboard_core::AccountMode;
use tradeboard_ctrader::TokenManager;
use tradeboard_gateway::GatewayRouter;
use tradeboard_scoring::LeaderboardRefresher;

/// The session's token managers, one per account mode. Both share the
/// same store and session; the mode only steers which client
/// credentials sign the token exchange.
pub struct SessionTokens {
    pub live: Arc<TokenManager>,
    pub demo: Arc<TokenManager>,
}

impl SessionTokens {
    #[must_use]
    pub fn for_mode(&self, mode: AccountMode) -> &Arc<TokenManager> {
        match mode {
            AccountMode::Live => &self.live,
            AccountMode::Demo => &self.demo,
        }
    }
}

/// Shared handler state.
pub struct AppState {
    pub gateways: GatewayRouter,
    pub tokens: SessionTokens,
    pub leaderboard: Arc<LeaderboardRefresher>,
}

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/validate/:platform", post(handlers::validate_credentials))
            .route("/proxy", get(handlers::proxy))
            .route("/oauth/token-exchange", post(handlers::token_exchange))
            .route("/leaderboard", get(handlers::leaderboard))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// The periodic leaderboard refresh is spawned alongside the
    /// listener and lives as long as the process.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or
    /// serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        tokio::spawn(self.state.leaderboard.clone().run());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

//! Routes trade operations to the client registered for a platform.

use std::collections::HashMap;
use std::sync::Arc;
use tradeboard_binance::{BinanceClient, BinanceClientConfig};
use tradeboard_bybit::{BybitClient, BybitClientConfig};
use tradeboard_core::{
    ExchangeError, NormalizedBatch, Platform, ProxyResponse, Result, TradeGateway, TradeQuery,
};

use crate::stub::Mt5StubGateway;

/// Maps each supported platform to its gateway implementation.
///
/// Routing is resolved before any signing or network work: an
/// unregistered platform fails immediately with an unsupported-platform
/// error.
pub struct GatewayRouter {
    gateways: HashMap<Platform, Arc<dyn TradeGateway>>,
}

impl std::fmt::Debug for GatewayRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRouter")
            .field("platforms", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for GatewayRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    /// Creates a router with the default set of gateways: Binance and
    /// Bybit over their production endpoints, and the MT5 stub.
    ///
    /// The cTrader gateway is session-scoped (it owns a token manager)
    /// and is registered separately via [`Self::register`].
    ///
    /// # Errors
    /// Returns an error if an underlying HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        let mut router = Self::new();
        router.register(
            Platform::Binance,
            Arc::new(BinanceClient::new(BinanceClientConfig::default())?),
        );
        router.register(
            Platform::Bybit,
            Arc::new(BybitClient::new(BybitClientConfig::default())?),
        );
        router.register(Platform::Mt5, Arc::new(Mt5StubGateway::new()));
        Ok(router)
    }

    /// Registers (or replaces) the gateway for a platform.
    pub fn register(&mut self, platform: Platform, gateway: Arc<dyn TradeGateway>) {
        tracing::debug!(platform = platform.as_str(), "registering gateway");
        self.gateways.insert(platform, gateway);
    }

    /// Looks up the gateway for a platform.
    ///
    /// # Errors
    /// `UnsupportedPlatform` when none is registered.
    pub fn gateway(&self, platform: Platform) -> Result<Arc<dyn TradeGateway>> {
        self.gateways
            .get(&platform)
            .cloned()
            .ok_or_else(|| ExchangeError::unsupported_platform(platform.as_str()))
    }

    /// Fetches and normalizes trades from a platform.
    ///
    /// # Errors
    /// Routing, credential, and upstream errors per the shared taxonomy.
    pub async fn fetch_trades(
        &self,
        platform: Platform,
        query: &TradeQuery,
    ) -> Result<NormalizedBatch> {
        self.gateway(platform)?.fetch_trades(query).await
    }

    /// Checks an api key/secret pair against a platform.
    ///
    /// # Errors
    /// Routing and upstream errors; a rejected pair is `Ok(false)`.
    pub async fn validate(
        &self,
        platform: Platform,
        api_key: &str,
        api_secret: &str,
    ) -> Result<bool> {
        self.gateway(platform)?.validate(api_key, api_secret).await
    }

    /// Forwards an authenticated passthrough call to a platform.
    ///
    /// # Errors
    /// Routing, credential, and upstream errors per the shared taxonomy.
    pub async fn proxy(
        &self,
        platform: Platform,
        endpoint: &str,
        params: &[(String, String)],
        query: &TradeQuery,
    ) -> Result<ProxyResponse> {
        self.gateway(platform)?.proxy(endpoint, params, query).await
    }
}

// =============================================================================
// Tests
// =============================================================================

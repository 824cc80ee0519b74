//! Binance REST client with rate limiting.
//!
//! Read-only access: credential validation, order history, and signed
//! passthrough for the proxy route. Signing always happens immediately
//! before dispatch so the timestamp stays inside the receive window.

use crate::auth::{BinanceSigner, API_KEY_HEADER};
use crate::normalizer::{normalize_orders, RawBinanceOrder};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use tradeboard_core::{
    Credential, CredentialResolver, ExchangeError, NormalizedBatch, Platform, ProxyResponse,
    Result, TradeGateway, TradeQuery,
};

// =============================================================================
// Constants
// =============================================================================

/// Binance production API base URL.
pub const BINANCE_API_URL: &str = "https://api.binance.com";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Binance client.
#[derive(Debug, Clone)]
pub struct BinanceClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BinanceClientConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_API_URL.to_string(),
            requests_per_minute: nonzero!(60u32),
            timeout_secs: 30,
        }
    }
}

impl BinanceClientConfig {
    /// Sets the base URL (useful for tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// BinanceClient
// =============================================================================

/// Binance REST API client.
///
/// Credentials are request-scoped: each call resolves its own pair
/// through the fallback chain and discards it afterwards.
pub struct BinanceClient {
    config: BinanceClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    resolver: CredentialResolver,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BinanceClientConfig) -> Result<Self> {
        Self::with_resolver(config, CredentialResolver::new())
    }

    /// Creates a client with an injected credential resolver (tests).
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_resolver(config: BinanceClientConfig, resolver: CredentialResolver) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            resolver,
        })
    }

    /// Issues a signed GET and returns the raw response.
    async fn signed_get(
        &self,
        credential: &Credential,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let signer = BinanceSigner::new(credential.api_secret.clone())?;
        // Timestamp is generated inside signed_query, right before dispatch.
        let query = signer.signed_query(params);
        let url = format!("{}{}?{}", self.config.base_url, endpoint, query);

        tracing::debug!(endpoint, "GET binance");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, &credential.api_key)
            .send()
            .await?;

        Ok(response)
    }

    /// Converts a non-success response into the shared taxonomy.
    async fn handle_failure(response: reqwest::Response) -> ExchangeError {
        let status = response.status();

        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return ExchangeError::rate_limited(retry_after);
        }

        let body = response.text().await.unwrap_or_default();
        ExchangeError::upstream(status.as_u16(), body)
    }

    /// Fetches the raw order history for a symbol.
    ///
    /// # Errors
    /// Returns an upstream or credential error on failure.
    pub async fn get_order_history(
        &self,
        credential: &Credential,
        symbol: &str,
    ) -> Result<Vec<RawBinanceOrder>> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let response = self
            .signed_get(credential, "/api/v3/allOrders", &params)
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_failure(response).await);
        }

        let orders = response.json::<Vec<RawBinanceOrder>>().await?;
        Ok(orders)
    }

    fn resolve(&self, query: &TradeQuery) -> Result<Credential> {
        self.resolver
            .resolve(Platform::Binance, query.mode, query.credential.as_ref())
    }
}

#[async_trait]
impl TradeGateway for BinanceClient {
    async fn fetch_trades(&self, query: &TradeQuery) -> Result<NormalizedBatch> {
        let credential = self.resolve(query)?;
        let symbol = query.symbol.as_deref().ok_or_else(|| {
            ExchangeError::Configuration(
                "binance order history requires a symbol filter".to_string(),
            )
        })?;

        let orders = self.get_order_history(&credential, symbol).await?;
        Ok(normalize_orders(&query.trader_profile_id, orders))
    }

    async fn validate(&self, api_key: &str, api_secret: &str) -> Result<bool> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ExchangeError::Configuration(
                "api_key and api_secret are required".to_string(),
            ));
        }

        let credential = Credential {
            platform: Platform::Binance,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            mode: tradeboard_core::AccountMode::Live,
            source: tradeboard_core::CredentialSource::Request,
        };

        let response = self.signed_get(&credential, "/api/v3/account", &[]).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(true);
        }
        // Rejected credentials are a negative answer, not a failure.
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Ok(false);
        }
        Err(Self::handle_failure(response).await)
    }

    async fn proxy(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        query: &TradeQuery,
    ) -> Result<ProxyResponse> {
        let credential = self.resolve(query)?;
        let response = self.signed_get(&credential, endpoint, params).await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ExchangeError::upstream(status.as_u16(), body));
        }
        Ok(ProxyResponse {
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Bybit v5 REST client with rate limiting.
//!
//! Read-only access: credential validation, closed-PnL history, and
//! signed passthrough for the proxy route. Bybit wraps most responses in
//! a `retCode`/`result` envelope; a non-zero `retCode` on a 200 response
//! is still a failure and is surfaced as one.

use crate::auth::BybitV5Signer;
use crate::normalizer::{normalize_closed_pnl, RawClosedPnlResult};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tradeboard_core::{
    AccountMode, Credential, CredentialResolver, CredentialSource, ExchangeError, NormalizedBatch,
    Platform, ProxyResponse, Result, TradeGateway, TradeQuery,
};

// =============================================================================
// Constants
// =============================================================================

/// Bybit production API base URL.
pub const BYBIT_API_URL: &str = "https://api.bybit.com";

/// Bybit demo trading API base URL.
pub const BYBIT_DEMO_URL: &str = "https://api-demo.bybit.com";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Bybit client.
#[derive(Debug, Clone)]
pub struct BybitClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BybitClientConfig {
    fn default() -> Self {
        Self {
            base_url: BYBIT_API_URL.to_string(),
            requests_per_minute: nonzero!(120u32),
            timeout_secs: 30,
        }
    }
}

impl BybitClientConfig {
    /// Creates a configuration for the demo trading environment.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            base_url: BYBIT_DEMO_URL.to_string(),
            ..Default::default()
        }
    }

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
// Response envelope
// =============================================================================

/// Bybit v5 response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V5Envelope<T> {
    ret_code: i64,
    ret_msg: Option<String>,
    result: Option<T>,
}

// Invalid-key return codes that mean "rejected", not "broken".
const RET_INVALID_KEY: i64 = 10003;
const RET_INVALID_SIGN: i64 = 10004;

// =============================================================================
// BybitClient
// =============================================================================

/// Bybit v5 REST API client.
pub struct BybitClient {
    config: BybitClientConfig,
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

impl std::fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl BybitClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BybitClientConfig) -> Result<Self> {
        Self::with_resolver(config, CredentialResolver::new())
    }

    /// Creates a client with an injected credential resolver (tests).
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_resolver(config: BybitClientConfig, resolver: CredentialResolver) -> Result<Self> {
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

    /// Issues a v5-signed GET and returns the raw response.
    async fn signed_get(
        &self,
        credential: &Credential,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let signer = BybitV5Signer::new(credential.api_key.clone(), credential.api_secret.clone())?;
        // Timestamp is generated inside sign_get, right before dispatch.
        let (headers, query) = signer.sign_get(params);

        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        };

        tracing::debug!(endpoint, "GET bybit");

        let mut request = self.http.get(&url).header("Accept", "application/json");
        for (name, value) in headers.as_tuples() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        Ok(response)
    }

    /// Converts a non-success response into the shared taxonomy.
    async fn handle_failure(response: reqwest::Response) -> ExchangeError {
        let status = response.status();

        if status.as_u16() == 429 {
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

    /// Fetches raw closed-PnL records, optionally filtered by symbol.
    ///
    /// # Errors
    /// Returns an upstream or credential error on failure.
    pub async fn get_closed_pnl(
        &self,
        credential: &Credential,
        symbol: Option<&str>,
    ) -> Result<RawClosedPnlResult> {
        let mut params = vec![("category".to_string(), "linear".to_string())];
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), symbol.to_string()));
        }

        let response = self
            .signed_get(credential, "/v5/position/closed-pnl", &params)
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_failure(response).await);
        }

        let envelope = response.json::<V5Envelope<RawClosedPnlResult>>().await?;
        if envelope.ret_code != 0 {
            return Err(ExchangeError::upstream(
                200,
                format!(
                    "retCode {}: {}",
                    envelope.ret_code,
                    envelope.ret_msg.unwrap_or_default()
                ),
            ));
        }

        Ok(envelope.result.unwrap_or(RawClosedPnlResult { list: None }))
    }

    fn resolve(&self, query: &TradeQuery) -> Result<Credential> {
        self.resolver
            .resolve(Platform::Bybit, query.mode, query.credential.as_ref())
    }
}

#[async_trait]
impl TradeGateway for BybitClient {
    async fn fetch_trades(&self, query: &TradeQuery) -> Result<NormalizedBatch> {
        let credential = self.resolve(query)?;
        let result = self
            .get_closed_pnl(&credential, query.symbol.as_deref())
            .await?;

        Ok(normalize_closed_pnl(
            &query.trader_profile_id,
            result.list.unwrap_or_default(),
        ))
    }

    async fn validate(&self, api_key: &str, api_secret: &str) -> Result<bool> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ExchangeError::Configuration(
                "api_key and api_secret are required".to_string(),
            ));
        }

        let credential = Credential {
            platform: Platform::Bybit,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            mode: AccountMode::Live,
            source: CredentialSource::Request,
        };

        let response = self
            .signed_get(&credential, "/v5/user/query-api", &[])
            .await?;
        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Self::handle_failure(response).await);
        }

        let envelope = response.json::<V5Envelope<serde_json::Value>>().await?;
        match envelope.ret_code {
            0 => Ok(true),
            RET_INVALID_KEY | RET_INVALID_SIGN => Ok(false),
            code => Err(ExchangeError::upstream(
                200,
                format!("retCode {code}: {}", envelope.ret_msg.unwrap_or_default()),
            )),
        }
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

//! cTrader REST client over a managed bearer token.
//!
//! Read-only access to the deal history of a linked trading account.
//! All authenticated calls obtain their header from [`TokenManager`],
//! which refreshes lazily; this client holds no credential state of
//! its own.

use crate::normalizer::{normalize_deals, RawDeal};
use crate::oauth::TokenManager;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tradeboard_core::{
    ExchangeError, NormalizedBatch, ProxyResponse, Result, TradeGateway, TradeQuery,
};

// =============================================================================
// Constants
// =============================================================================

/// cTrader Open API base URL.
pub const CTRADER_API_URL: &str = "https://api.spotware.com";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the cTrader client.
#[derive(Debug, Clone)]
pub struct CtraderClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CtraderClientConfig {
    fn default() -> Self {
        Self {
            base_url: CTRADER_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl CtraderClientConfig {
    /// Sets the base URL (useful for tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
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

/// Deal-history response envelope.
#[derive(Debug, Clone, Deserialize)]
struct DealsEnvelope {
    data: Option<Vec<RawDeal>>,
}

// =============================================================================
// CtraderClient
// =============================================================================

/// cTrader Open API client.
pub struct CtraderClient {
    config: CtraderClientConfig,
    http: Client,
    tokens: Arc<TokenManager>,
}

impl std::fmt::Debug for CtraderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtraderClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl CtraderClient {
    /// Creates a new client around a session's token manager.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: CtraderClientConfig, tokens: Arc<TokenManager>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            tokens,
        })
    }

    /// Issues an authenticated GET and returns the raw response.
    async fn authed_get(&self, endpoint: &str, params: &[(String, String)]) -> Result<reqwest::Response> {
        // The manager refreshes lazily before handing out the header.
        let auth = self.tokens.auth_header().await?;

        tracing::debug!(endpoint, "GET ctrader");

        let response = self
            .http
            .get(format!("{}{}", self.config.base_url, endpoint))
            .query(params)
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .send()
            .await?;
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

    /// Fetches raw deal history for a linked trading account.
    ///
    /// # Errors
    /// Returns an upstream or token error on failure.
    pub async fn get_deals(&self, account_id: &str) -> Result<Vec<RawDeal>> {
        let endpoint = format!("/connect/tradingaccounts/{account_id}/deals");
        let response = self.authed_get(&endpoint, &[]).await?;

        if !response.status().is_success() {
            return Err(Self::handle_failure(response).await);
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.unwrap_or_default();

        if !content_type.contains("json") {
            return Err(ExchangeError::upstream_format(content_type, &body));
        }

        let envelope: DealsEnvelope = serde_json::from_str(&body)?;
        Ok(envelope.data.unwrap_or_default())
    }
}

#[async_trait]
impl TradeGateway for CtraderClient {
    async fn fetch_trades(&self, query: &TradeQuery) -> Result<NormalizedBatch> {
        let deals = self.get_deals(&query.trader_profile_id).await?;
        Ok(normalize_deals(&query.trader_profile_id, deals))
    }

    async fn validate(&self, _api_key: &str, _api_secret: &str) -> Result<bool> {
        Err(ExchangeError::Configuration(
            "ctrader authenticates via the OAuth flow, not api_key/api_secret".to_string(),
        ))
    }

    async fn proxy(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        _query: &TradeQuery,
    ) -> Result<ProxyResponse> {
        let response = self.authed_get(endpoint, params).await?;
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

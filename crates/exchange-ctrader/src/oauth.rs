//! OAuth2 token lifecycle for the cTrader provider.
//!
//! The flow: a one-time authorization code is exchanged for an
//! access/refresh token pair; the pair is persisted per session; every
//! authenticated call goes through [`TokenManager::auth_header`], which
//! refreshes lazily when the token is expired. Refresh is serialized per
//! session so concurrent callers share one in-flight refresh instead of
//! racing the provider (which revokes a refresh token after first use).
//!
//! Client credentials are resolved through the same fallback chain as
//! exchange API keys, with `CLIENT_ID`/`CLIENT_SECRET` variable names.

use crate::store::{StoredToken, TokenStore};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tradeboard_core::{AccountMode, CredentialResolver, EnvSource, ExchangeError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Default cTrader token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://openapi.ctrader.com/apps/token";

/// Environment variable overriding the token endpoint.
pub const TOKEN_URL_ENV: &str = "CTRADER_TOKEN_URL";

/// Retry-after fallback when the provider rate-limits without a hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 300;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the OAuth exchanger.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Token endpoint URL.
    pub token_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl OAuthConfig {
    /// Creates a config honoring the `CTRADER_TOKEN_URL` override.
    #[must_use]
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = Self::default();
        if let Some(url) = env.get(TOKEN_URL_ENV).filter(|v| !v.is_empty()) {
            config.token_url = url;
        }
        config
    }

    /// Sets the token endpoint URL (useful for tests).
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

// =============================================================================
// Wire shapes
// =============================================================================

/// Token endpoint response, strict intermediate form.
#[derive(Debug, Clone, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// A successful grant: the stored token plus the provider payload
/// (with the derived absolute expiry injected) for passthrough to the
/// client, which persists it on its side of the boundary.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: StoredToken,
    pub raw: serde_json::Value,
}

// =============================================================================
// OAuthExchanger
// =============================================================================

/// Stateless wire operations against the token endpoint.
pub struct OAuthExchanger {
    http: Client,
    config: OAuthConfig,
    resolver: CredentialResolver,
}

impl std::fmt::Debug for OAuthExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthExchanger")
            .field("token_url", &self.config.token_url)
            .finish_non_exhaustive()
    }
}

impl OAuthExchanger {
    /// Creates an exchanger with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        Self::with_resolver(config, CredentialResolver::new())
    }

    /// Creates an exchanger with an injected credential resolver (tests).
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_resolver(config: OAuthConfig, resolver: CredentialResolver) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            resolver,
        })
    }

    /// Exchanges a one-time authorization code for a token pair.
    ///
    /// # Errors
    /// `RateLimited` on 429 (with the Retry-After hint, default 300s),
    /// `UpstreamFormat` for non-JSON success bodies, `TokenExchange`
    /// for other non-success statuses, `MissingCredential` when no
    /// client id/secret pair resolves.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        mode: AccountMode,
    ) -> Result<TokenGrant> {
        let (client_id, client_secret) = self.client_credentials(mode)?;
        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        self.request_token(&form).await
    }

    /// Exchanges a refresh token for a fresh pair.
    ///
    /// # Errors
    /// Same taxonomy as [`Self::exchange_code`].
    pub async fn refresh_grant(&self, refresh_token: &str, mode: AccountMode) -> Result<TokenGrant> {
        let (client_id, client_secret) = self.client_credentials(mode)?;
        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        self.request_token(&form).await
    }

    fn client_credentials(&self, mode: AccountMode) -> Result<(String, String)> {
        self.resolver
            .resolve_pair("CTRADER", "CLIENT_ID", "CLIENT_SECRET", mode)
    }

    async fn request_token(&self, form: &[(&str, String)]) -> Result<TokenGrant> {
        tracing::debug!(token_url = %self.config.token_url, "POST token endpoint");

        let response = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ExchangeError::rate_limited(retry_after));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::token_exchange(status.as_u16(), body));
        }

        // The provider serves HTML error pages with a 200 under some
        // failure modes; check the declared type before parsing.
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

        let raw: RawTokenResponse = serde_json::from_str(&body)?;
        let mut raw_value: serde_json::Value = serde_json::from_str(&body)?;

        let issued_at = Utc::now();
        let expires_at = raw
            .expires_in
            .map(|secs| issued_at + Duration::seconds(secs));

        if let (Some(obj), Some(expiry)) = (raw_value.as_object_mut(), expires_at) {
            obj.insert(
                "expires_at".to_string(),
                serde_json::Value::from(expiry.timestamp()),
            );
        }

        Ok(TokenGrant {
            token: StoredToken {
                access_token: raw.access_token,
                refresh_token: raw.refresh_token,
                issued_at,
                expires_at,
            },
            raw: raw_value,
        })
    }
}

// =============================================================================
// TokenManager
// =============================================================================

/// Session-scoped token lifecycle: exchange, expiry tracking, lazy
/// single-flight refresh, revocation.
///
/// Callers never read the raw token; [`Self::auth_header`] is the single
/// authenticated-call entry point.
pub struct TokenManager {
    exchanger: OAuthExchanger,
    store: Arc<dyn TokenStore>,
    session_id: String,
    mode: AccountMode,
    /// Serializes refresh per session; waiters re-check expiry after
    /// acquisition so they reuse the winner's token.
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("session_id", &self.session_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager for one session.
    #[must_use]
    pub fn new(
        exchanger: OAuthExchanger,
        store: Arc<dyn TokenStore>,
        session_id: impl Into<String>,
        mode: AccountMode,
    ) -> Self {
        Self {
            exchanger,
            store,
            session_id: session_id.into(),
            mode,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Exchanges an authorization code and stores the resulting token.
    ///
    /// # Errors
    /// Propagates the exchanger's taxonomy; the store is only written
    /// on success.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        let grant = self
            .exchanger
            .exchange_code(code, redirect_uri, self.mode)
            .await?;
        self.store.put(&self.session_id, grant.token.clone()).await;
        Ok(grant)
    }

    /// True when no token exists or the stored token has expired.
    pub async fn is_expired(&self) -> bool {
        match self.store.get(&self.session_id).await {
            Some(token) => token.is_expired_at(Utc::now()),
            None => true,
        }
    }

    /// Forces a refresh of the stored token.
    ///
    /// # Errors
    /// `NoRefreshToken` when none is stored; upstream failures leave
    /// the old token untouched.
    pub async fn refresh(&self) -> Result<StoredToken> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Returns a `Bearer` header, refreshing lazily when expired.
    ///
    /// Concurrent callers during a pending refresh all resolve to the
    /// same refreshed token: the refresh critical section is held by
    /// one caller and the rest re-check the store after acquisition.
    ///
    /// # Errors
    /// `NoRefreshToken` when the token is absent or expired with no
    /// refresh token stored; otherwise the exchanger's taxonomy.
    pub async fn auth_header(&self) -> Result<String> {
        if let Some(token) = self.store.get(&self.session_id).await {
            if !token.is_expired_at(Utc::now()) {
                return Ok(format!("Bearer {}", token.access_token));
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // A concurrent caller may have refreshed while we waited.
        if let Some(token) = self.store.get(&self.session_id).await {
            if !token.is_expired_at(Utc::now()) {
                return Ok(format!("Bearer {}", token.access_token));
            }
        }

        let token = self.refresh_locked().await?;
        Ok(format!("Bearer {}", token.access_token))
    }

    /// Clears the stored token (provider sign-out).
    pub async fn revoke(&self) {
        self.store.clear(&self.session_id).await;
    }

    /// Refreshes under the lock. The replacement is atomic: access
    /// token, refresh token and expiry land in the store together, and
    /// only on success.
    async fn refresh_locked(&self) -> Result<StoredToken> {
        let stored = self.store.get(&self.session_id).await;
        let refresh_token = stored
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or(ExchangeError::NoRefreshToken)?;

        let grant = self
            .exchanger
            .refresh_grant(&refresh_token, self.mode)
            .await?;

        // Providers may omit the refresh token on rotation; keep the
        // old one in that case.
        let mut token = grant.token;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }

        self.store.put(&self.session_id, token.clone()).await;
        Ok(token)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenStore;
    use tradeboard_core::MapSource;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_env() -> MapSource {
        MapSource::new()
            .with("CTRADER_LIVE_CLIENT_ID", "client-id")
            .with("CTRADER_LIVE_CLIENT_SECRET", "client-secret")
    }

    fn exchanger(server: &MockServer, env: MapSource) -> OAuthExchanger {
        OAuthExchanger::with_resolver(
            OAuthConfig::default().with_token_url(format!("{}/apps/token", server.uri())),
            CredentialResolver::with_env(env),
        )
        .unwrap()
    }

    fn token_body(access: &str, refresh: Option<&str>, expires_in: i64) -> serde_json::Value {
        let mut body = serde_json::json!({
            "access_token": access,
            "token_type": "bearer",
            "expires_in": expires_in,
        });
        if let Some(refresh) = refresh {
            body["refresh_token"] = serde_json::Value::from(refresh);
        }
        body
    }

    fn manager(server: &MockServer, store: Arc<dyn TokenStore>) -> TokenManager {
        TokenManager::new(
            exchanger(server, client_env()),
            store,
            "session-1",
            AccountMode::Live,
        )
    }

    fn expired_token() -> StoredToken {
        StoredToken {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            issued_at: Utc::now() - Duration::hours(2),
            expires_at: Some(Utc::now() - Duration::hours(1)),
        }
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_config_default_token_url() {
        assert_eq!(OAuthConfig::default().token_url, DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_config_env_override() {
        let env = MapSource::new().with(TOKEN_URL_ENV, "https://example.com/token");
        assert_eq!(
            OAuthConfig::from_env(&env).token_url,
            "https://example.com/token"
        );
    }

    // ==================== Exchange Tests ====================

    #[tokio::test]
    async fn test_exchange_code_derives_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=one-time-code"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("access-1", Some("refresh-1"), 2628000)),
            )
            .mount(&server)
            .await;

        let before = Utc::now();
        let grant = exchanger(&server, client_env())
            .exchange_code("one-time-code", "https://app/callback", AccountMode::Live)
            .await
            .unwrap();

        let expires_at = grant.token.expires_at.unwrap();
        assert!(expires_at >= before + Duration::seconds(2628000));
        assert_eq!(grant.token.access_token, "access-1");
        assert!(grant.raw.get("expires_at").is_some());
    }

    #[tokio::test]
    async fn test_exchange_code_missing_client_credentials() {
        let server = MockServer::start().await;
        let err = exchanger(&server, MapSource::new())
            .exchange_code("code", "https://app/callback", AccountMode::Live)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredential { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_code_rate_limited_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "90")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = exchanger(&server, client_env())
            .exchange_code("code", "https://app/callback", AccountMode::Live)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::RateLimited {
                retry_after_secs: 90
            }
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_rate_limited_default_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = exchanger(&server, client_env())
            .exchange_code("code", "https://app/callback", AccountMode::Live)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::RateLimited {
                retry_after_secs: 300
            }
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_html_body_is_format_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>Maintenance</body></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let err = exchanger(&server, client_env())
            .exchange_code("code", "https://app/callback", AccountMode::Live)
            .await
            .unwrap_err();
        match err {
            ExchangeError::UpstreamFormat {
                content_type,
                snippet,
            } => {
                assert!(content_type.contains("text/html"));
                assert!(snippet.contains("Maintenance"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_upstream_failure_carries_status_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = exchanger(&server, client_env())
            .exchange_code("used-code", "https://app/callback", AccountMode::Live)
            .await
            .unwrap_err();
        match err {
            ExchangeError::TokenExchange { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ==================== Manager Tests ====================

    #[tokio::test]
    async fn test_is_expired_with_no_token() {
        let server = MockServer::start().await;
        let manager = manager(&server, Arc::new(InMemoryTokenStore::new()));
        assert!(manager.is_expired().await);
    }

    #[tokio::test]
    async fn test_exchange_code_persists_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("access-1", Some("refresh-1"), 3600)),
            )
            .mount(&server)
            .await;

        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        let manager = manager(&server, store.clone());
        manager
            .exchange_code("code", "https://app/callback")
            .await
            .unwrap();

        assert!(!manager.is_expired().await);
        assert!(store.get("session-1").await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_without_token_fails() {
        let server = MockServer::start().await;
        let manager = manager(&server, Arc::new(InMemoryTokenStore::new()));
        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, ExchangeError::NoRefreshToken));
    }

    #[tokio::test]
    async fn test_refresh_moves_expiry_forward() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("access-2", Some("refresh-2"), 3600)),
            )
            .mount(&server)
            .await;

        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        let stale = expired_token();
        let old_expiry = stale.expires_at.unwrap();
        store.put("session-1", stale).await;

        let manager = manager(&server, store.clone());
        let refreshed = manager.refresh().await.unwrap();

        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-2"));
        assert!(refreshed.expires_at.unwrap() > old_expiry);
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_body("access-2", None, 3600)),
            )
            .mount(&server)
            .await;

        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        store.put("session-1", expired_token()).await;

        let manager = manager(&server, store.clone());
        let refreshed = manager.refresh().await.unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_old_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        store.put("session-1", expired_token()).await;

        let manager = manager(&server, store.clone());
        assert!(manager.refresh().await.is_err());

        let stored = store.get("session-1").await.unwrap();
        assert_eq!(stored.access_token, "stale");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_auth_header_returns_bearer_without_refresh() {
        let server = MockServer::start().await;
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        store
            .put(
                "session-1",
                StoredToken {
                    access_token: "fresh".to_string(),
                    refresh_token: None,
                    issued_at: Utc::now(),
                    expires_at: Some(Utc::now() + Duration::hours(1)),
                },
            )
            .await;

        let manager = manager(&server, store);
        assert_eq!(manager.auth_header().await.unwrap(), "Bearer fresh");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_auth_headers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("access-2", Some("refresh-2"), 3600))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        store.put("session-1", expired_token()).await;

        let manager = Arc::new(manager(&server, store));
        let (a, b, c) = tokio::join!(
            manager.auth_header(),
            manager.auth_header(),
            manager.auth_header()
        );

        assert_eq!(a.unwrap(), "Bearer access-2");
        assert_eq!(b.unwrap(), "Bearer access-2");
        assert_eq!(c.unwrap(), "Bearer access-2");
    }

    #[tokio::test]
    async fn test_revoke_clears_token() {
        let server = MockServer::start().await;
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        store.put("session-1", expired_token()).await;

        let manager = manager(&server, store.clone());
        manager.revoke().await;
        assert!(store.get("session-1").await.is_none());
    }
}

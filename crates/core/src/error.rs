//! Shared error taxonomy for exchange integrations.
//!
//! One enum covers every integration so the [`crate::TradeGateway`]
//! trait can route heterogeneous providers behind a single error type.
//! Failures keep their upstream status and body for diagnosis; this
//! layer never retries on its own and never coerces a failure into an
//! empty success value.

use thiserror::Error;

/// Errors that can occur when talking to an exchange or provider.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Missing or empty secret, key or other configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No credential could be resolved through the fallback chain.
    #[error("missing credential for {platform}: tried {tried}")]
    MissingCredential {
        /// Platform whose credential was requested.
        platform: String,
        /// Variable sets consulted, in fallback order.
        tried: String,
    },

    /// Platform string is not routable. Raised before any signing or
    /// network work.
    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform {
        /// The unrecognized platform name.
        platform: String,
    },

    /// Upstream signalled rate limiting.
    #[error("rate limited by upstream, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retry, from the Retry-After hint.
        retry_after_secs: u64,
    },

    /// Upstream returned a non-JSON body (commonly an HTML error page).
    #[error("unexpected upstream format ({content_type}): {snippet}")]
    UpstreamFormat {
        /// Content type the upstream declared.
        content_type: String,
        /// Leading bytes of the body, for diagnosis.
        snippet: String,
    },

    /// Upstream returned a non-success status.
    #[error("upstream error: {status} - {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Token endpoint rejected an exchange or refresh request.
    #[error("token exchange failed: {status} - {body}")]
    TokenExchange {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A refresh was requested but no refresh token is stored.
    #[error("no refresh token stored for session")]
    NoRefreshToken,

    /// Upstream call timed out.
    #[error("upstream timeout: {0}")]
    Timeout(String),

    /// Network-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A canonical-schema invariant was violated.
    #[error("validation error: {0}")]
    Validation(String),
}

impl ExchangeError {
    /// Creates an upstream error from status code and body.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Creates a token exchange error from status code and body.
    pub fn token_exchange(status: u16, body: impl Into<String>) -> Self {
        Self::TokenExchange {
            status,
            body: body.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates an unsupported platform error.
    pub fn unsupported_platform(platform: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            platform: platform.into(),
        }
    }

    /// Creates an upstream format error, truncating the body to a
    /// diagnostic snippet.
    pub fn upstream_format(content_type: impl Into<String>, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        Self::UpstreamFormat {
            content_type: content_type.into(),
            snippet,
        }
    }

    /// Returns true if the request may succeed when retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Upstream { status, .. } | Self::TokenExchange { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    /// This layer does not retry; the hint is surfaced for callers.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::Network(_) | Self::Timeout(_) => Some(1),
            Self::Upstream { status, .. } | Self::TokenExchange { status, .. }
                if *status >= 500 =>
            {
                Some(2)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

//! HMAC-SHA256 request signing for the Binance API.
//!
//! Binance signs the request query string with the account's API secret.
//! For the credential-validation ping the canonical string is exactly
//! `timestamp=<ms_epoch>`; richer queries sign the full query string with
//! the timestamp appended last. Signing is pure and deterministic given
//! the timestamp; the timestamp is generated immediately before signing
//! to stay inside the provider's receive window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tradeboard_core::{ExchangeError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key on every authenticated request.
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Signs Binance query strings with HMAC-SHA256.
pub struct BinanceSigner {
    secret: String,
}

impl std::fmt::Debug for BinanceSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl BinanceSigner {
    /// Creates a signer from the API secret.
    ///
    /// # Errors
    /// Returns `ExchangeError::Configuration` when the secret is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ExchangeError::Configuration(
                "binance API secret is empty".to_string(),
            ));
        }
        Ok(Self { secret })
    }

    /// Computes the hex HMAC-SHA256 signature over a canonical query
    /// string.
    #[must_use]
    pub fn sign(&self, canonical: &str) -> String {
        // new_from_slice only fails for unusable key lengths, which
        // HMAC does not have; the empty case is rejected at construction.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Builds the signed query for the current timestamp.
    #[must_use]
    pub fn signed_query(&self, params: &[(String, String)]) -> String {
        self.signed_query_with_timestamp(params, now_ms())
    }

    /// Builds the signed query with an explicit timestamp (deterministic
    /// for tests). The canonical string is the joined params with
    /// `timestamp` appended last; `signature` is appended after signing.
    #[must_use]
    pub fn signed_query_with_timestamp(
        &self,
        params: &[(String, String)],
        timestamp_ms: u64,
    ) -> String {
        let mut canonical = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if !canonical.is_empty() {
            canonical.push('&');
        }
        canonical.push_str(&format!("timestamp={timestamp_ms}"));

        let signature = self.sign(&canonical);
        format!("{canonical}&signature={signature}")
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================

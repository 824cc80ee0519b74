//! HMAC-SHA256 authentication for the Bybit API.
//!
//! Two schemes live here:
//!
//! - **v5**: canonical string `timestamp + api_key + recv_window +
//!   sorted_query_string`, signature carried in `X-BAPI-*` headers. The
//!   receive window is fixed at 5000ms to bound replay tolerance.
//! - **legacy**: caller params plus `api_key` and `timestamp` sorted
//!   alphabetically, joined `k=v&k=v`, with the hex signature appended
//!   as a `sign` query parameter.
//!
//! Signing is pure and deterministic given the timestamp. Timestamps are
//! generated immediately before signing so the signed request stays
//! inside the provider's receive window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tradeboard_core::{ExchangeError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Fixed receive window for v5 requests, in milliseconds.
pub const RECV_WINDOW_MS: u64 = 5000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn hmac_hex(secret: &str, canonical: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sorts params alphabetically and joins them `k=v&k=v`.
fn sorted_query(params: &[(String, String)]) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

// =============================================================================
// Signed headers (v5)
// =============================================================================

/// Headers required for authenticated Bybit v5 requests.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// X-BAPI-API-KEY header.
    pub api_key: String,

    /// X-BAPI-SIGN header (hex encoded).
    pub signature: String,

    /// X-BAPI-TIMESTAMP header (Unix timestamp in milliseconds).
    pub timestamp: String,

    /// X-BAPI-RECV-WINDOW header.
    pub recv_window: String,
}

impl SignedHeaders {
    /// Returns headers as tuples for reqwest.
    #[must_use]
    pub fn as_tuples(&self) -> [(&'static str, &str); 4] {
        [
            ("X-BAPI-API-KEY", &self.api_key),
            ("X-BAPI-SIGN", &self.signature),
            ("X-BAPI-TIMESTAMP", &self.timestamp),
            ("X-BAPI-RECV-WINDOW", &self.recv_window),
        ]
    }
}

// =============================================================================
// BybitV5Signer
// =============================================================================

/// Signs Bybit v5 requests.
pub struct BybitV5Signer {
    api_key: String,
    secret: String,
}

impl std::fmt::Debug for BybitV5Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitV5Signer")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl BybitV5Signer {
    /// Creates a signer from an API key and secret.
    ///
    /// # Errors
    /// Returns `ExchangeError::Configuration` when the secret is empty.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ExchangeError::Configuration(
                "bybit API secret is empty".to_string(),
            ));
        }
        Ok(Self {
            api_key: api_key.into(),
            secret,
        })
    }

    /// Signs a GET request's query params and returns the v5 headers
    /// plus the sorted query string to dispatch.
    #[must_use]
    pub fn sign_get(&self, params: &[(String, String)]) -> (SignedHeaders, String) {
        self.sign_get_with_timestamp(params, now_ms())
    }

    /// Signs with an explicit timestamp (deterministic for tests).
    ///
    /// Canonical string: `timestamp + api_key + recv_window + query`.
    #[must_use]
    pub fn sign_get_with_timestamp(
        &self,
        params: &[(String, String)],
        timestamp_ms: u64,
    ) -> (SignedHeaders, String) {
        let query = sorted_query(params);
        let canonical = format!("{timestamp_ms}{}{RECV_WINDOW_MS}{query}", self.api_key);
        let signature = hmac_hex(&self.secret, &canonical);

        (
            SignedHeaders {
                api_key: self.api_key.clone(),
                signature,
                timestamp: timestamp_ms.to_string(),
                recv_window: RECV_WINDOW_MS.to_string(),
            },
            query,
        )
    }
}

// =============================================================================
// LegacySigner
// =============================================================================

/// Signs requests for the legacy (pre-v5) API.
pub struct LegacySigner {
    api_key: String,
    secret: String,
}

impl std::fmt::Debug for LegacySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacySigner")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl LegacySigner {
    /// Creates a signer from an API key and secret.
    ///
    /// # Errors
    /// Returns `ExchangeError::Configuration` when the secret is empty.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ExchangeError::Configuration(
                "bybit API secret is empty".to_string(),
            ));
        }
        Ok(Self {
            api_key: api_key.into(),
            secret,
        })
    }

    /// Builds the full signed query string for the current timestamp.
    #[must_use]
    pub fn signed_query(&self, params: &[(String, String)]) -> String {
        self.signed_query_with_timestamp(params, now_ms())
    }

    /// Builds the signed query with an explicit timestamp.
    ///
    /// `api_key` and `timestamp` are interleaved with the caller params
    /// before alphabetical sorting; the signature is appended as `sign`.
    #[must_use]
    pub fn signed_query_with_timestamp(
        &self,
        params: &[(String, String)],
        timestamp_ms: u64,
    ) -> String {
        let mut all: Vec<(String, String)> = params.to_vec();
        all.push(("api_key".to_string(), self.api_key.clone()));
        all.push(("timestamp".to_string(), timestamp_ms.to_string()));

        let canonical = sorted_query(&all);
        let signature = hmac_hex(&self.secret, &canonical);
        format!("{canonical}&sign={signature}")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    // ==================== v5 Tests ====================

    #[test]
    fn test_v5_empty_secret_rejected() {
        assert!(BybitV5Signer::new("key", "").is_err());
    }

    #[test]
    fn test_v5_deterministic() {
        let signer = BybitV5Signer::new("key", "secret").unwrap();
        let p = params(&[("category", "linear")]);
        let (h1, _) = signer.sign_get_with_timestamp(&p, 1_700_000_000_000);
        let (h2, _) = signer.sign_get_with_timestamp(&p, 1_700_000_000_000);
        assert_eq!(h1.signature, h2.signature);
    }

    #[test]
    fn test_v5_canonical_layout() {
        // Any single-byte change in timestamp, key or query must change
        // the signature.
        let signer = BybitV5Signer::new("key", "secret").unwrap();
        let p = params(&[("category", "linear")]);
        let (base, _) = signer.sign_get_with_timestamp(&p, 1_700_000_000_000);

        let (ts_changed, _) = signer.sign_get_with_timestamp(&p, 1_700_000_000_001);
        assert_ne!(base.signature, ts_changed.signature);

        let other_key = BybitV5Signer::new("key2", "secret").unwrap();
        let (key_changed, _) = other_key.sign_get_with_timestamp(&p, 1_700_000_000_000);
        assert_ne!(base.signature, key_changed.signature);

        let p2 = params(&[("category", "inverse")]);
        let (query_changed, _) = signer.sign_get_with_timestamp(&p2, 1_700_000_000_000);
        assert_ne!(base.signature, query_changed.signature);
    }

    #[test]
    fn test_v5_query_sorted() {
        let signer = BybitV5Signer::new("key", "secret").unwrap();
        let p = params(&[("symbol", "BTCUSDT"), ("category", "linear")]);
        let (_, query) = signer.sign_get_with_timestamp(&p, 1);
        assert_eq!(query, "category=linear&symbol=BTCUSDT");
    }

    #[test]
    fn test_v5_recv_window_fixed() {
        let signer = BybitV5Signer::new("key", "secret").unwrap();
        let (headers, _) = signer.sign_get_with_timestamp(&[], 1);
        assert_eq!(headers.recv_window, "5000");
    }

    #[test]
    fn test_v5_headers_tuples() {
        let signer = BybitV5Signer::new("my-key", "secret").unwrap();
        let (headers, _) = signer.sign_get_with_timestamp(&[], 1_700_000_000_000);
        let tuples = headers.as_tuples();
        assert_eq!(tuples[0], ("X-BAPI-API-KEY", "my-key"));
        assert_eq!(tuples[2], ("X-BAPI-TIMESTAMP", "1700000000000"));
        assert_eq!(tuples[3], ("X-BAPI-RECV-WINDOW", "5000"));
    }

    #[test]
    fn test_v5_signature_is_hex() {
        let signer = BybitV5Signer::new("key", "secret").unwrap();
        let (headers, _) = signer.sign_get_with_timestamp(&[], 1);
        assert_eq!(headers.signature.len(), 64);
        assert!(headers.signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // ==================== Legacy Tests ====================

    #[test]
    fn test_legacy_empty_secret_rejected() {
        assert!(LegacySigner::new("key", "").is_err());
    }

    #[test]
    fn test_legacy_params_sorted_with_interleaved_fields() {
        let signer = LegacySigner::new("zkey", "secret").unwrap();
        let p = params(&[("symbol", "BTCUSD")]);
        let query = signer.signed_query_with_timestamp(&p, 1_700_000_000_000);

        // api_key < symbol < timestamp alphabetically; sign appended last.
        assert!(query.starts_with("api_key=zkey&symbol=BTCUSD&timestamp=1700000000000&sign="));
    }

    #[test]
    fn test_legacy_signature_matches_manual_hmac() {
        let signer = LegacySigner::new("key", "secret").unwrap();
        let query = signer.signed_query_with_timestamp(&[], 1000);
        let expected = hmac_hex("secret", "api_key=key&timestamp=1000");
        assert_eq!(query, format!("api_key=key&timestamp=1000&sign={expected}"));
    }

    #[test]
    fn test_legacy_deterministic() {
        let signer = LegacySigner::new("key", "secret").unwrap();
        let p = params(&[("symbol", "BTCUSD")]);
        assert_eq!(
            signer.signed_query_with_timestamp(&p, 5),
            signer.signed_query_with_timestamp(&p, 5)
        );
    }
}

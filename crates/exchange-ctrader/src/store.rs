//! Session-scoped token persistence.
//!
//! Token fields are the only durable state owned by the OAuth layer.
//! The store is keyed by session id and never shared across sessions;
//! replacement is whole-token so an interrupted refresh can never leave
//! a half-updated pair behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A persisted access/refresh token pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Absolute expiry, derived from the provider's `expires_in`.
    /// `None` means the provider reported no lifetime.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// True when the token must not be used at `now`.
    ///
    /// A token with no recorded expiry is treated as expired: fail
    /// closed rather than send a possibly dead token upstream.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session-keyed token persistence.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the token for a session, if any.
    async fn get(&self, session_id: &str) -> Option<StoredToken>;

    /// Replaces the session's token wholesale.
    async fn put(&self, session_id: &str, token: StoredToken);

    /// Removes the session's token (provider sign-out).
    async fn clear(&self, session_id: &str);
}

/// In-memory token store.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, StoredToken>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, session_id: &str) -> Option<StoredToken> {
        self.tokens.read().await.get(session_id).cloned()
    }

    async fn put(&self, session_id: &str, token: StoredToken) {
        self.tokens.write().await.insert(session_id.to_string(), token);
    }

    async fn clear(&self, session_id: &str) {
        self.tokens.write().await.remove(session_id);
    }
}

// =============================================================================
// Tests
// =============================================================================

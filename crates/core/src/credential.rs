//! Credential resolution with a deterministic fallback chain.
//!
//! Each platform's key/secret pair can arrive from the request itself or
//! from mode-split or legacy environment variables. The fallback order is
//! an ordered, declarative rule list evaluated generically:
//!
//! 1. Per-request explicit credential.
//! 2. Mode-specific environment pair (`{PREFIX}_LIVE_*` / `{PREFIX}_DEMO_*`).
//! 3. Legacy unversioned environment pair (`{PREFIX}_*`).
//! 4. Demo mode only: fall back to the live pair (logged as degraded).
//!
//! The first rule producing a complete pair wins; a key without a secret
//! counts as absent. Resolution either returns a fully populated
//! [`Credential`] or fails naming every variable set consulted.

use crate::error::{ExchangeError, Result};
use crate::types::{AccountMode, Platform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Environment source
// =============================================================================

/// Source of environment values, injectable for tests.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `key`, or `None` when unset.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory environment for tests.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    vars: HashMap<String, String>,
}

impl MapSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

// =============================================================================
// Credential shapes
// =============================================================================

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Request,
    Environment,
}

/// Key/secret pair supplied by the caller on a single request.
#[derive(Clone, Serialize, Deserialize)]
pub struct RequestCredential {
    pub api_key: String,
    pub api_secret: String,
}

impl RequestCredential {
    /// True when both fields are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl fmt::Debug for RequestCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCredential")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// A fully resolved credential. Request-scoped: created per call and
/// discarded with it, never persisted.
#[derive(Clone)]
pub struct Credential {
    pub platform: Platform,
    pub api_key: String,
    pub api_secret: String,
    pub mode: AccountMode,
    pub source: CredentialSource,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("platform", &self.platform)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("mode", &self.mode)
            .field("source", &self.source)
            .finish()
    }
}

// =============================================================================
// Resolution rules
// =============================================================================

/// One entry in the environment fallback chain.
#[derive(Debug, Clone)]
struct ResolutionRule {
    label: &'static str,
    key_var: String,
    secret_var: String,
    /// True for the demo-to-live fallback, which is logged when taken.
    degraded: bool,
}

/// Builds the ordered environment rule list for a variable pair.
///
/// `key_suffix`/`secret_suffix` are `API_KEY`/`API_SECRET` for exchange
/// credentials and `CLIENT_ID`/`CLIENT_SECRET` for OAuth clients; the
/// chain is identical for both.
fn env_rules(
    prefix: &str,
    key_suffix: &str,
    secret_suffix: &str,
    mode: AccountMode,
) -> Vec<ResolutionRule> {
    let mut rules = vec![
        ResolutionRule {
            label: "mode-specific environment",
            key_var: format!("{prefix}_{}_{key_suffix}", mode.env_infix()),
            secret_var: format!("{prefix}_{}_{secret_suffix}", mode.env_infix()),
            degraded: false,
        },
        ResolutionRule {
            label: "legacy environment",
            key_var: format!("{prefix}_{key_suffix}"),
            secret_var: format!("{prefix}_{secret_suffix}"),
            degraded: false,
        },
    ];
    if mode == AccountMode::Demo {
        rules.push(ResolutionRule {
            label: "live fallback for demo",
            key_var: format!("{prefix}_LIVE_{key_suffix}"),
            secret_var: format!("{prefix}_LIVE_{secret_suffix}"),
            degraded: true,
        });
    }
    rules
}

// =============================================================================
// CredentialResolver
// =============================================================================

/// Resolves credentials through the documented fallback chain.
pub struct CredentialResolver {
    env: Box<dyn EnvSource>,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialResolver {
    /// Creates a resolver backed by the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            env: Box::new(ProcessEnv),
        }
    }

    /// Creates a resolver with an injected environment source.
    #[must_use]
    pub fn with_env(env: impl EnvSource + 'static) -> Self {
        Self { env: Box::new(env) }
    }

    /// Resolves the API credential for `platform` in `mode`.
    ///
    /// # Errors
    /// Returns `ExchangeError::MissingCredential` naming every variable
    /// set consulted when no complete pair is found.
    pub fn resolve(
        &self,
        platform: Platform,
        mode: AccountMode,
        request: Option<&RequestCredential>,
    ) -> Result<Credential> {
        if let Some(req) = request {
            if req.is_complete() {
                return Ok(Credential {
                    platform,
                    api_key: req.api_key.clone(),
                    api_secret: req.api_secret.clone(),
                    mode,
                    source: CredentialSource::Request,
                });
            }
        }

        let (api_key, api_secret) =
            self.resolve_pair(platform.env_prefix(), "API_KEY", "API_SECRET", mode)
                .map_err(|err| match err {
                    ExchangeError::MissingCredential { tried, .. } => {
                        ExchangeError::MissingCredential {
                            platform: platform.to_string(),
                            tried,
                        }
                    }
                    other => other,
                })?;

        Ok(Credential {
            platform,
            api_key,
            api_secret,
            mode,
            source: CredentialSource::Environment,
        })
    }

    /// Resolves an arbitrary environment variable pair through the same
    /// chain. Used for OAuth client credentials as well as API keys.
    ///
    /// # Errors
    /// Returns `ExchangeError::MissingCredential` when no rule yields a
    /// complete pair.
    pub fn resolve_pair(
        &self,
        prefix: &str,
        key_suffix: &str,
        secret_suffix: &str,
        mode: AccountMode,
    ) -> Result<(String, String)> {
        let rules = env_rules(prefix, key_suffix, secret_suffix, mode);
        let mut tried = Vec::with_capacity(rules.len());

        for rule in &rules {
            let key = self.env.get(&rule.key_var).filter(|v| !v.is_empty());
            let secret = self.env.get(&rule.secret_var).filter(|v| !v.is_empty());

            if let (Some(key), Some(secret)) = (key, secret) {
                if rule.degraded {
                    tracing::warn!(
                        prefix,
                        rule = rule.label,
                        "demo credentials absent, falling back to live pair"
                    );
                }
                return Ok((key, secret));
            }
            tried.push(format!(
                "{} ({}/{})",
                rule.label, rule.key_var, rule.secret_var
            ));
        }

        Err(ExchangeError::MissingCredential {
            platform: prefix.to_ascii_lowercase(),
            tried: tried.join(", "),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request_cred() -> RequestCredential {
        RequestCredential {
            api_key: "req-key".to_string(),
            api_secret: "req-secret".to_string(),
        }
    }

    // ==================== Fallback Order Tests ====================

    #[test]
    fn test_request_credential_wins_over_environment() {
        let env = MapSource::new()
            .with("BYBIT_LIVE_API_KEY", "env-key")
            .with("BYBIT_LIVE_API_SECRET", "env-secret");
        let resolver = CredentialResolver::with_env(env);

        let cred = resolver
            .resolve(Platform::Bybit, AccountMode::Live, Some(&request_cred()))
            .unwrap();
        assert_eq!(cred.api_key, "req-key");
        assert_eq!(cred.source, CredentialSource::Request);
    }

    #[test]
    fn test_mode_specific_wins_over_legacy() {
        let env = MapSource::new()
            .with("BYBIT_LIVE_API_KEY", "live-key")
            .with("BYBIT_LIVE_API_SECRET", "live-secret")
            .with("BYBIT_API_KEY", "legacy-key")
            .with("BYBIT_API_SECRET", "legacy-secret");
        let resolver = CredentialResolver::with_env(env);

        let cred = resolver
            .resolve(Platform::Bybit, AccountMode::Live, None)
            .unwrap();
        assert_eq!(cred.api_key, "live-key");
        assert_eq!(cred.source, CredentialSource::Environment);
    }

    #[test]
    fn test_legacy_used_when_mode_specific_absent() {
        let env = MapSource::new()
            .with("BINANCE_API_KEY", "legacy-key")
            .with("BINANCE_API_SECRET", "legacy-secret");
        let resolver = CredentialResolver::with_env(env);

        let cred = resolver
            .resolve(Platform::Binance, AccountMode::Live, None)
            .unwrap();
        assert_eq!(cred.api_key, "legacy-key");
    }

    #[test]
    fn test_demo_falls_back_to_live_pair() {
        let env = MapSource::new()
            .with("BYBIT_LIVE_API_KEY", "live-key")
            .with("BYBIT_LIVE_API_SECRET", "live-secret");
        let resolver = CredentialResolver::with_env(env);

        let cred = resolver
            .resolve(Platform::Bybit, AccountMode::Demo, None)
            .unwrap();
        assert_eq!(cred.api_key, "live-key");
        assert_eq!(cred.mode, AccountMode::Demo);
    }

    #[test]
    fn test_demo_prefers_demo_pair_over_live() {
        let env = MapSource::new()
            .with("BYBIT_DEMO_API_KEY", "demo-key")
            .with("BYBIT_DEMO_API_SECRET", "demo-secret")
            .with("BYBIT_LIVE_API_KEY", "live-key")
            .with("BYBIT_LIVE_API_SECRET", "live-secret");
        let resolver = CredentialResolver::with_env(env);

        let cred = resolver
            .resolve(Platform::Bybit, AccountMode::Demo, None)
            .unwrap();
        assert_eq!(cred.api_key, "demo-key");
    }

    // ==================== Partial Pair Tests ====================

    #[test]
    fn test_key_without_secret_counts_as_absent() {
        let env = MapSource::new()
            .with("BYBIT_LIVE_API_KEY", "live-key")
            .with("BYBIT_API_KEY", "legacy-key")
            .with("BYBIT_API_SECRET", "legacy-secret");
        let resolver = CredentialResolver::with_env(env);

        let cred = resolver
            .resolve(Platform::Bybit, AccountMode::Live, None)
            .unwrap();
        assert_eq!(cred.api_key, "legacy-key");
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let env = MapSource::new()
            .with("BYBIT_LIVE_API_KEY", "")
            .with("BYBIT_LIVE_API_SECRET", "");
        let resolver = CredentialResolver::with_env(env);

        let err = resolver
            .resolve(Platform::Bybit, AccountMode::Live, None)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredential { .. }));
    }

    #[test]
    fn test_incomplete_request_credential_falls_through() {
        let env = MapSource::new()
            .with("BYBIT_API_KEY", "legacy-key")
            .with("BYBIT_API_SECRET", "legacy-secret");
        let resolver = CredentialResolver::with_env(env);

        let partial = RequestCredential {
            api_key: "only-key".to_string(),
            api_secret: String::new(),
        };
        let cred = resolver
            .resolve(Platform::Bybit, AccountMode::Live, Some(&partial))
            .unwrap();
        assert_eq!(cred.api_key, "legacy-key");
        assert_eq!(cred.source, CredentialSource::Environment);
    }

    // ==================== Failure Tests ====================

    #[test]
    fn test_missing_credential_names_tried_sets() {
        let resolver = CredentialResolver::with_env(MapSource::new());
        let err = resolver
            .resolve(Platform::Binance, AccountMode::Demo, None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("BINANCE_DEMO_API_KEY"));
        assert!(msg.contains("BINANCE_API_KEY"));
        assert!(msg.contains("BINANCE_LIVE_API_KEY"));
    }

    #[test]
    fn test_live_mode_does_not_try_demo_fallback() {
        let env = MapSource::new()
            .with("BYBIT_DEMO_API_KEY", "demo-key")
            .with("BYBIT_DEMO_API_SECRET", "demo-secret");
        let resolver = CredentialResolver::with_env(env);

        assert!(resolver
            .resolve(Platform::Bybit, AccountMode::Live, None)
            .is_err());
    }

    // ==================== OAuth Pair Tests ====================

    #[test]
    fn test_resolve_pair_for_oauth_client() {
        let env = MapSource::new()
            .with("CTRADER_LIVE_CLIENT_ID", "client-id")
            .with("CTRADER_LIVE_CLIENT_SECRET", "client-secret");
        let resolver = CredentialResolver::with_env(env);

        let (id, secret) = resolver
            .resolve_pair("CTRADER", "CLIENT_ID", "CLIENT_SECRET", AccountMode::Live)
            .unwrap();
        assert_eq!(id, "client-id");
        assert_eq!(secret, "client-secret");
    }

    // ==================== Redaction Tests ====================

    #[test]
    fn test_credential_debug_redacts_secret() {
        let cred = Credential {
            platform: Platform::Bybit,
            api_key: "key".to_string(),
            api_secret: "super-secret".to_string(),
            mode: AccountMode::Live,
            source: CredentialSource::Request,
        };
        let debug = format!("{cred:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_request_credential_debug_redacts_secret() {
        let debug = format!("{:?}", request_cred());
        assert!(!debug.contains("req-secret"));
    }

    // ==================== Determinism Tests ====================

    #[test]
    fn test_resolution_is_deterministic() {
        let env = MapSource::new()
            .with("BYBIT_LIVE_API_KEY", "live-key")
            .with("BYBIT_LIVE_API_SECRET", "live-secret")
            .with("BYBIT_API_KEY", "legacy-key")
            .with("BYBIT_API_SECRET", "legacy-secret");
        let resolver = CredentialResolver::with_env(env);

        for _ in 0..5 {
            let cred = resolver
                .resolve(Platform::Bybit, AccountMode::Live, None)
                .unwrap();
            assert_eq!(cred.api_key, "live-key");
        }
    }
}

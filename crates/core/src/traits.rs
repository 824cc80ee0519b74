//! Trait seams between the routing layer and the exchange integrations.

use crate::error::Result;
use crate::types::{NormalizedBatch, ProxyResponse, TradeQuery};
use async_trait::async_trait;

/// One exchange integration, real or stubbed.
///
/// Implementations own their signing scheme and normalization; callers
/// only ever see canonical trades and the shared error taxonomy.
#[async_trait]
pub trait TradeGateway: Send + Sync {
    /// Fetches and normalizes the trade history for one trader.
    async fn fetch_trades(&self, query: &TradeQuery) -> Result<NormalizedBatch>;

    /// Checks whether an API key/secret pair is accepted by the
    /// provider. A rejected pair is `Ok(false)`; transport or
    /// configuration failures are errors.
    async fn validate(&self, api_key: &str, api_secret: &str) -> Result<bool>;

    /// Issues a signed read-only call to an arbitrary provider endpoint
    /// and returns the upstream status and body verbatim.
    async fn proxy(&self, endpoint: &str, params: &[(String, String)], query: &TradeQuery)
        -> Result<ProxyResponse>;
}

//! cTrader integration: OAuth2 token lifecycle with a session-scoped
//! token store, authenticated deal history, and normalization into the
//! canonical trade schema.
//!
//! Unlike the signature-based exchanges, cTrader authenticates with a
//! bearer token obtained by exchanging a one-time authorization code.
//! [`TokenManager`] owns the only durable state in this layer: the
//! access/refresh token pair persisted per session.

pub mod client;
pub mod normalizer;
pub mod oauth;
pub mod store;

pub use client::{CtraderClient, CtraderClientConfig, CTRADER_API_URL};
pub use normalizer::{normalize_deals, RawCloseDetail, RawDeal};
pub use oauth::{
    OAuthConfig, OAuthExchanger, TokenGrant, TokenManager, DEFAULT_TOKEN_URL, TOKEN_URL_ENV,
};
pub use store::{InMemoryTokenStore, StoredToken, TokenStore};

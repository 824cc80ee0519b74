//! Bybit integration: v5 and legacy request signing, closed-PnL REST
//! access and normalization into the canonical trade schema.

pub mod auth;
pub mod client;
pub mod normalizer;

pub use auth::{BybitV5Signer, LegacySigner, SignedHeaders, RECV_WINDOW_MS};
pub use client::{BybitClient, BybitClientConfig, BYBIT_API_URL};
pub use normalizer::{normalize_closed_pnl, RawClosedPnl, RawClosedPnlResult};

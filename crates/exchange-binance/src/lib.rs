//! Binance integration: timestamp-signed REST access and order-history
//! normalization into the canonical trade schema.

pub mod auth;
pub mod client;
pub mod normalizer;

pub use auth::BinanceSigner;
pub use client::{BinanceClient, BinanceClientConfig, BINANCE_API_URL};
pub use normalizer::{normalize_orders, RawBinanceOrder};

//! Core types and traits for the tradeboard aggregation layer.
//!
//! Everything the per-exchange crates share lives here: the canonical
//! [`TradeRecord`] schema, the credential resolution chain, the shared
//! error taxonomy and the [`TradeGateway`] trait that every exchange
//! integration (real or stubbed) implements.

pub mod credential;
pub mod error;
pub mod traits;
pub mod types;

pub use credential::{
    Credential, CredentialResolver, CredentialSource, EnvSource, MapSource, ProcessEnv,
    RequestCredential,
};
pub use error::{ExchangeError, Result};
pub use traits::TradeGateway;
pub use types::{
    AccountMode, NormalizedBatch, Platform, ProxyResponse, TradeDirection, TradeQuery,
    TradeRecord, TraderProfile,
};

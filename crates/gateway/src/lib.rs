//! Platform routing over the exchange clients.
//!
//! [`GatewayRouter`] maps a platform identifier to the client that
//! speaks its protocol and rejects unsupported platforms before any
//! signing or network work happens. Platforms without a live
//! integration are served by [`Mt5StubGateway`] behind the same
//! contract as the real clients.

pub mod router;
pub mod stub;

pub use router::GatewayRouter;
pub use stub::Mt5StubGateway;

//! Order gateway for perpbot.
//!
//! The quoting and strategy loops talk to the exchange only through the
//! `OrderGateway` capability defined here:
//! - `InfoClient`: public market data over the info endpoint
//! - `PaperGateway`: simulated account on top of live market data
//! - `ThrottledGateway`: rate budgets and per-symbol mutation ordering
//! - `MockGateway`: scripted gateway for tests

pub mod error;
pub mod gateway;
pub mod info_client;
pub mod mock;
pub mod paper;
pub mod rate_limiter;
pub mod throttled;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    BoxFuture, LimitOrderRequest, MarketOrderRequest, OrderAmount, OrderGateway, QuoteAck,
    QuoteRequest,
};
pub use info_client::{InfoClient, MarketDataSource, MAINNET_INFO_URL, TESTNET_INFO_URL};
pub use mock::{MockCall, MockGateway, MockOp};
pub use paper::{PaperAccount, PaperGateway};
pub use rate_limiter::RateLimiter;
pub use throttled::{ThrottleConfig, ThrottledGateway};

use std::sync::Arc;

/// Shared gateway handle.
pub type DynGateway = Arc<dyn OrderGateway>;

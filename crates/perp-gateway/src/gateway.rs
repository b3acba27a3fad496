//! Order gateway capability.
//!
//! Abstracts price/orderbook queries and order mutations against a single
//! trading account. This allows for:
//! - Dependency injection for testing (`MockGateway`)
//! - Paper trading against live public prices (`PaperGateway`)
//! - Throttling/serialization as a wrapper (`ThrottledGateway`)

use std::future::Future;
use std::pin::Pin;

use perp_core::{
    Candle, InstrumentSpec, Order, OrderSide, Position, Price, Size, SpreadSnapshot, Timeframe,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Amount of a market order: base size or USD notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAmount {
    Size(Size),
    Usd(Decimal),
}

/// Two-sided quote placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: String,
    pub bid: Price,
    pub ask: Price,
    pub size: Size,
    /// Cancel resting orders for the symbol before placing.
    pub cancel_existing: bool,
    pub post_only: bool,
}

/// Orders created by a quote placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteAck {
    pub bid_order: Order,
    pub ask_order: Order,
    /// Resting orders cancelled first.
    pub cancelled: usize,
}

/// Single limit order placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Price,
    pub size: Size,
    pub post_only: bool,
}

/// Market (taker) order placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub amount: OrderAmount,
    /// Worst acceptable price.
    pub limit_price: Option<Price>,
    pub reduce_only: bool,
}

/// Trading capability for one account.
///
/// All methods are async and object-safe so loops can share an
/// `Arc<dyn OrderGateway>`.
pub trait OrderGateway: Send + Sync {
    /// Current mid price.
    fn price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Price>>;

    /// Top-of-book snapshot.
    fn spread<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>>;

    /// Tick/lot/minimum-notional rules.
    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>>;

    /// Most recent `limit` candles, oldest first.
    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>>;

    /// Open position for the symbol, `None` when flat.
    fn position<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Option<Position>>>;

    /// All open positions on the account.
    fn positions(&self) -> BoxFuture<'_, GatewayResult<Vec<Position>>>;

    /// Resting orders, optionally filtered by symbol.
    fn open_orders<'a>(&'a self, symbol: Option<&'a str>)
        -> BoxFuture<'a, GatewayResult<Vec<Order>>>;

    /// Account equity in USD (balance plus unrealized PnL).
    fn equity(&self) -> BoxFuture<'_, GatewayResult<Decimal>>;

    fn quote(&self, request: QuoteRequest) -> BoxFuture<'_, GatewayResult<QuoteAck>>;

    fn limit_order(&self, request: LimitOrderRequest) -> BoxFuture<'_, GatewayResult<Order>>;

    fn market_order(&self, request: MarketOrderRequest) -> BoxFuture<'_, GatewayResult<Order>>;

    /// Reduce-only close of the whole position or `size` of it.
    /// Returns `None` when there is nothing to close.
    fn close<'a>(
        &'a self,
        symbol: &'a str,
        size: Option<Size>,
    ) -> BoxFuture<'a, GatewayResult<Option<Order>>>;

    /// Cancel resting orders for a symbol, or all symbols. Returns the count.
    fn cancel_all<'a>(&'a self, symbol: Option<&'a str>) -> BoxFuture<'a, GatewayResult<usize>>;

    /// Set account leverage for the symbol. Applied exchange-side.
    fn set_leverage<'a>(&'a self, symbol: &'a str, leverage: u32)
        -> BoxFuture<'a, GatewayResult<()>>;

    fn limit_buy(
        &self,
        symbol: &str,
        price: Price,
        size: Size,
        post_only: bool,
    ) -> BoxFuture<'_, GatewayResult<Order>> {
        self.limit_order(LimitOrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            price,
            size,
            post_only,
        })
    }

    fn limit_sell(
        &self,
        symbol: &str,
        price: Price,
        size: Size,
        post_only: bool,
    ) -> BoxFuture<'_, GatewayResult<Order>> {
        self.limit_order(LimitOrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            price,
            size,
            post_only,
        })
    }

    fn buy(
        &self,
        symbol: &str,
        amount: OrderAmount,
        limit_price: Option<Price>,
    ) -> BoxFuture<'_, GatewayResult<Order>> {
        self.market_order(MarketOrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            amount,
            limit_price,
            reduce_only: false,
        })
    }

    fn sell(
        &self,
        symbol: &str,
        amount: OrderAmount,
        limit_price: Option<Price>,
    ) -> BoxFuture<'_, GatewayResult<Order>> {
        self.market_order(MarketOrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            amount,
            limit_price,
            reduce_only: false,
        })
    }
}

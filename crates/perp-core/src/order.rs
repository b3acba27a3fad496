//! Orders as the gateways report them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Price, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        })
    }
}

/// Exchange time-in-force codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    #[serde(rename = "Gtc")]
    GoodTilCancelled,
    /// Immediate-or-cancel (market orders).
    #[serde(rename = "Ioc")]
    ImmediateOrCancel,
    /// Add-liquidity-only (post-only).
    #[serde(rename = "Alo")]
    AddLiquidityOnly,
}

impl TimeInForce {
    /// Limit order TIF for the given post-only flag.
    pub fn for_limit(post_only: bool) -> Self {
        if post_only {
            Self::AddLiquidityOnly
        } else {
            Self::GoodTilCancelled
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GoodTilCancelled => "Gtc",
            Self::ImmediateOrCancel => "Ioc",
            Self::AddLiquidityOnly => "Alo",
        })
    }
}

/// Client order ID.
///
/// Every order carries a unique cloid so a resubmission after a
/// transient failure on the next cycle is never mistaken for the original.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// `pb_{unix_ms}_{8 hex}`.
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("pb_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an order as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting on the book.
    Resting,
    /// Fully filled.
    Filled,
    /// Cancelled before fill.
    Cancelled,
}

/// An order acknowledged by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub cloid: ClientOrderId,
    pub symbol: String,
    pub side: OrderSide,
    /// Limit price; `None` for market orders.
    pub price: Option<Price>,
    pub size: Size,
    pub tif: TimeInForce,
    pub reduce_only: bool,
    pub status: OrderStatus,
    /// Average fill price when filled.
    pub fill_price: Option<Price>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// New resting limit order.
    pub fn resting(
        symbol: impl Into<String>,
        side: OrderSide,
        price: Price,
        size: Size,
        post_only: bool,
    ) -> Self {
        Self {
            cloid: ClientOrderId::new(),
            symbol: symbol.into(),
            side,
            price: Some(price),
            size,
            tif: TimeInForce::for_limit(post_only),
            reduce_only: false,
            status: OrderStatus::Resting,
            fill_price: None,
            created_at: Utc::now(),
        }
    }

    /// Immediately filled taker order.
    pub fn filled(
        symbol: impl Into<String>,
        side: OrderSide,
        size: Size,
        fill_price: Price,
        reduce_only: bool,
    ) -> Self {
        Self {
            cloid: ClientOrderId::new(),
            symbol: symbol.into(),
            side,
            price: None,
            size,
            tif: TimeInForce::ImmediateOrCancel,
            reduce_only,
            status: OrderStatus::Filled,
            fill_price: Some(fill_price),
            created_at: Utc::now(),
        }
    }

    /// Whether this order only adds liquidity.
    pub fn is_post_only(&self) -> bool {
        self.tif == TimeInForce::AddLiquidityOnly
    }

    /// Notional at the limit or fill price, whichever is known.
    pub fn notional(&self) -> Option<rust_decimal::Decimal> {
        self.fill_price
            .or(self.price)
            .map(|px| self.size.notional(px))
    }
}

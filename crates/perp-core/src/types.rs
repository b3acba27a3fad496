//! Market data and account types.
//!
//! Contains the top-of-book snapshot, instrument specification,
//! position and candle structures returned by the order gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OrderSide, Price, Size};

/// Top-of-book snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadSnapshot {
    pub bid: Price,
    pub ask: Price,
    pub mid: Price,
    pub spread_bps: Decimal,
    pub received_at: DateTime<Utc>,
}

impl SpreadSnapshot {
    /// Build from best bid/ask.
    ///
    /// Returns `None` for an empty or crossed book.
    pub fn from_bbo(bid: Price, ask: Price) -> Option<Self> {
        if !bid.is_positive() || !ask.is_positive() || bid >= ask {
            return None;
        }
        let mid = Price::new((bid.inner() + ask.inner()) / Decimal::TWO);
        let spread_bps = (ask.inner() - bid.inner()) / mid.inner() * Decimal::from(10_000);
        Some(Self {
            bid,
            ask,
            mid,
            spread_bps,
            received_at: Utc::now(),
        })
    }
}

/// Static trading rules of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: Price,
    /// Minimum size increment.
    pub lot_size: Size,
    /// Smallest accepted order value in USD.
    pub min_notional: Decimal,
    pub max_leverage: u32,
}

impl InstrumentSpec {
    /// Spec with the given tick and lot, a $10 minimum and 20x max leverage.
    pub fn new(symbol: impl Into<String>, tick_size: Price, lot_size: Size) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            lot_size,
            min_notional: Decimal::TEN,
            max_leverage: 20,
        }
    }
}

/// Open position in one symbol.
///
/// `size` is signed: positive = long, negative = short. A symbol has at
/// most one position per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub size: Decimal,
    pub entry_price: Price,
    pub leverage: u32,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, size: Decimal, entry_price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            size,
            entry_price,
            leverage: 1,
            opened_at: Utc::now(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Side of the position, `None` when flat.
    pub fn side(&self) -> Option<OrderSide> {
        if self.size > Decimal::ZERO {
            Some(OrderSide::Buy)
        } else if self.size < Decimal::ZERO {
            Some(OrderSide::Sell)
        } else {
            None
        }
    }

    /// Signed USD exposure at `mark`.
    pub fn notional_usd(&self, mark: Price) -> Decimal {
        self.size * mark.inner()
    }

    /// Unrealized PnL in USD at `mark`.
    pub fn unrealized_pnl(&self, mark: Price) -> Decimal {
        (mark.inner() - self.entry_price.inner()) * self.size
    }

    /// Price-based PnL percentage at `mark` (unlevered).
    ///
    /// Positive when the position is in profit.
    pub fn pnl_pct(&self, mark: Price) -> Decimal {
        let Some(move_pct) = mark.pct_from(self.entry_price) else {
            return Decimal::ZERO;
        };
        match self.side() {
            Some(OrderSide::Buy) => move_pct,
            Some(OrderSide::Sell) => -move_pct,
            None => Decimal::ZERO,
        }
    }

    /// Apply a fill and return the realized PnL it produced.
    ///
    /// Reducing fills realize PnL against the average entry; adding fills
    /// re-average the entry; a fill that flips the side opens the remainder
    /// at the fill price.
    pub fn apply_fill(&mut self, side: OrderSide, price: Price, size: Size) -> Decimal {
        let signed = match side {
            OrderSide::Buy => size.inner(),
            OrderSide::Sell => -size.inner(),
        };
        let old = self.size;
        let new = old + signed;
        let px = price.inner();
        let entry = self.entry_price.inner();

        let reducing = (old > Decimal::ZERO && signed < Decimal::ZERO)
            || (old < Decimal::ZERO && signed > Decimal::ZERO);
        let realized = if reducing {
            let closed = signed.abs().min(old.abs());
            if old > Decimal::ZERO {
                (px - entry) * closed
            } else {
                (entry - px) * closed
            }
        } else {
            Decimal::ZERO
        };

        if new.is_zero() {
            self.entry_price = Price::ZERO;
        } else if old.is_zero()
            || (reducing && new.is_sign_negative() != old.is_sign_negative())
        {
            self.entry_price = price;
            if old.is_zero() {
                self.opened_at = Utc::now();
            }
        } else if !reducing {
            let total = old.abs() * entry + signed.abs() * px;
            self.entry_price = Price::new(total / new.abs());
        }

        self.size = new;
        realized
    }
}

/// OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Decimal,
}

impl Candle {
    /// Flat candle where every price equals `close`. Handy for synthetic series.
    pub fn flat(open_time: DateTime<Utc>, close: Price) -> Self {
        Self {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        }
    }
}

//! Precision-safe decimal types for quoting and sizing.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Quote math works in
//! basis points of the mid price, so float rounding would show up directly
//! as spread violations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Price with exact decimal precision.
///
/// Wraps `Decimal` so prices and sizes cannot be mixed up in calculations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(pub Decimal);

/// Size/quantity in base units with exact decimal precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Size(pub Decimal);

macro_rules! decimal_newtype {
    ($name:ident) => {
        impl $name {
            pub const ZERO: Self = Self(Decimal::ZERO);

            #[inline]
            pub fn new(value: Decimal) -> Self {
                Self(value)
            }

            #[inline]
            pub fn inner(&self) -> Decimal {
                self.0
            }

            #[inline]
            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            #[inline]
            pub fn is_positive(&self) -> bool {
                self.0 > Decimal::ZERO
            }

            #[inline]
            pub fn abs(&self) -> Self {
                Self(self.0.abs())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.normalize())
            }
        }

        impl FromStr for $name {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Decimal> for $name {
            fn from(d: Decimal) -> Self {
                Self(d)
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;

            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<Decimal> for $name {
            type Output = Self;

            fn mul(self, rhs: Decimal) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<Decimal> for $name {
            type Output = Self;

            fn div(self, rhs: Decimal) -> Self::Output {
                Self(self.0 / rhs)
            }
        }
    };
}

decimal_newtype!(Price);
decimal_newtype!(Size);

impl Price {
    /// Round down to the tick (used for bids).
    #[inline]
    pub fn floor_to_tick(&self, tick_size: Price) -> Self {
        if !tick_size.is_positive() {
            return *self;
        }
        Self((self.0 / tick_size.0).floor() * tick_size.0)
    }

    /// Round up to the tick (used for asks).
    #[inline]
    pub fn ceil_to_tick(&self, tick_size: Price) -> Self {
        if !tick_size.is_positive() {
            return *self;
        }
        Self((self.0 / tick_size.0).ceil() * tick_size.0)
    }

    /// Signed basis-point distance from `reference`.
    #[inline]
    pub fn bps_from(&self, reference: Price) -> Option<Decimal> {
        if reference.is_zero() {
            return None;
        }
        Some((self.0 - reference.0) / reference.0 * BPS)
    }

    /// Signed percentage distance from `reference`.
    #[inline]
    pub fn pct_from(&self, reference: Price) -> Option<Decimal> {
        if reference.is_zero() {
            return None;
        }
        Some((self.0 - reference.0) / reference.0 * Decimal::ONE_HUNDRED)
    }

    /// Shift by a signed number of basis points of this price.
    #[inline]
    pub fn offset_bps(&self, bps: Decimal) -> Self {
        Self(self.0 + self.0 * bps / BPS)
    }
}

impl Size {
    /// Round down to the lot size.
    #[inline]
    pub fn round_to_lot(&self, lot_size: Size) -> Self {
        if !lot_size.is_positive() {
            return *self;
        }
        Self((self.0 / lot_size.0).floor() * lot_size.0)
    }

    /// Base size worth `usd` at `price`. Zero when price is not positive.
    #[inline]
    pub fn from_usd(usd: Decimal, price: Price) -> Self {
        if !price.is_positive() {
            return Self::ZERO;
        }
        Self(usd / price.0)
    }

    /// Notional value: size * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_bps() {
        let mid = Price::new(dec!(100));
        let ask = Price::new(dec!(100.2));

        assert_eq!(ask.bps_from(mid).unwrap(), dec!(20));
        assert!(ask.bps_from(Price::ZERO).is_none());
    }

    #[test]
    fn test_tick_rounding_is_directional() {
        let tick = Price::new(dec!(0.05));
        let px = Price::new(dec!(99.97));

        assert_eq!(px.floor_to_tick(tick).inner(), dec!(99.95));
        assert_eq!(px.ceil_to_tick(tick).inner(), dec!(100.00));
        // Already on tick: unchanged both ways
        let on_tick = Price::new(dec!(99.95));
        assert_eq!(on_tick.floor_to_tick(tick), on_tick.ceil_to_tick(tick));
    }

    #[test]
    fn test_zero_tick_is_noop() {
        let px = Price::new(dec!(1.23456));
        assert_eq!(px.floor_to_tick(Price::ZERO), px);
        assert_eq!(px.ceil_to_tick(Price::ZERO), px);
    }

    #[test]
    fn test_offset_bps() {
        let px = Price::new(dec!(200));
        assert_eq!(px.offset_bps(dec!(-10)).inner(), dec!(199.8));
    }

    #[test]
    fn test_size_from_usd_and_lot() {
        let size = Size::from_usd(dec!(50), Price::new(dec!(3)));
        let lot = Size::new(dec!(0.01));

        assert_eq!(size.round_to_lot(lot).inner(), dec!(16.66));
        assert_eq!(Size::from_usd(dec!(50), Price::ZERO), Size::ZERO);
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!(Price::new(dec!(99.7500)).to_string(), "99.75");
    }
}

//! Inventory state for market making.
//!
//! Rebuilt every cycle from a fresh position snapshot and the mid price;
//! nothing is carried between cycles except the daily PnL baseline.

use perp_core::{Position, Price};
use perp_risk::Exposure;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Net exposure for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryState {
    pub symbol: String,
    /// Signed USD exposure at the mid (positive = long).
    pub inventory_usd: Decimal,
    /// Signed position size.
    pub position_size: Decimal,
    pub entry_price: Option<Price>,
    pub unrealized_pnl: Decimal,
    /// Price-based PnL percent of the position, `None` when flat.
    pub position_pnl_pct: Option<Decimal>,
    pub daily_pnl: Decimal,
}

impl InventoryState {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            inventory_usd: Decimal::ZERO,
            position_size: Decimal::ZERO,
            entry_price: None,
            unrealized_pnl: Decimal::ZERO,
            position_pnl_pct: None,
            daily_pnl: Decimal::ZERO,
        }
    }

    /// Build from the gateway's position, marked at `mid`.
    pub fn from_position(
        symbol: &str,
        position: Option<&Position>,
        mid: Price,
        daily_pnl: Decimal,
    ) -> Self {
        match position.filter(|p| !p.is_flat()) {
            Some(p) => Self {
                symbol: symbol.to_string(),
                inventory_usd: p.notional_usd(mid),
                position_size: p.size,
                entry_price: Some(p.entry_price),
                unrealized_pnl: p.unrealized_pnl(mid),
                position_pnl_pct: Some(p.pnl_pct(mid)),
                daily_pnl,
            },
            None => Self {
                daily_pnl,
                ..Self::flat(symbol)
            },
        }
    }

    /// Same state with a different inventory. Handy for what-if quoting.
    pub fn with_inventory(symbol: impl Into<String>, inventory_usd: Decimal) -> Self {
        Self {
            inventory_usd,
            ..Self::flat(symbol)
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position_size.is_zero()
    }

    /// Risk guard input.
    pub fn exposure(&self) -> Exposure {
        Exposure {
            inventory_usd: self.inventory_usd,
            position_pnl_pct: self.position_pnl_pct,
            daily_pnl: self.daily_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_short_position_has_negative_inventory() {
        let position = Position::new("ETH", dec!(-0.5), Price::new(dec!(2000)));
        let state =
            InventoryState::from_position("ETH", Some(&position), Price::new(dec!(2100)), dec!(-3));

        assert_eq!(state.inventory_usd, dec!(-1050));
        assert_eq!(state.unrealized_pnl, dec!(-50));
        assert_eq!(state.position_pnl_pct, Some(dec!(-5)));
        assert_eq!(state.daily_pnl, dec!(-3));
    }

    #[test]
    fn test_no_position_is_flat() {
        let state = InventoryState::from_position("ETH", None, Price::new(dec!(2000)), dec!(12));
        assert!(state.is_flat());
        assert_eq!(state.exposure().position_pnl_pct, None);
        assert_eq!(state.exposure().daily_pnl, dec!(12));
    }
}

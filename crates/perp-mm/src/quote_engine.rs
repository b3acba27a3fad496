//! Quote price calculation engine.
//!
//! Computes bid/ask prices from:
//! - Mid price
//! - Base spread with a hard floor (min_spread_bps)
//! - Inventory skew (shift both quotes to reduce exposure)
//! - Tick/lot rounding away from mid

use perp_core::{InstrumentSpec, OrderSide, Price, Size, SpreadSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::MarketMakerConfig;
use crate::inventory::InventoryState;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// An additional quote level beyond the top level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLevel {
    /// Level index (1 = first level behind the top).
    pub level: u32,
    pub bid: Price,
    pub ask: Price,
    pub spread_bps: Decimal,
}

/// Computed two-sided quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: Price,
    pub ask_price: Price,
    /// Size per side, rounded to the lot.
    pub size: Size,
    /// Quoted spread after rounding, relative to mid.
    pub spread_bps: Decimal,
    pub skew_bps: Decimal,
    /// Side not to quote because its fill would exceed the position cap.
    pub suppressed: Option<OrderSide>,
    /// Ladder levels, innermost first.
    pub levels: Vec<QuoteLevel>,
}

impl Quote {
    pub fn quotes_side(&self, side: OrderSide) -> bool {
        self.suppressed != Some(side)
    }
}

/// Skew in bps for the inventory, clamped to the max inventory.
pub fn skew_bps(inventory_usd: Decimal, max_inventory_usd: Decimal, skew_per_100_usd: Decimal) -> Decimal {
    let clamped = inventory_usd.max(-max_inventory_usd).min(max_inventory_usd);
    clamped / HUNDRED * skew_per_100_usd
}

/// Bid/ask around a skewed center, floored at `min_spread_bps` and
/// rounded to the tick away from mid.
fn priced_pair(
    mid: Decimal,
    center: Decimal,
    spread_bps: Decimal,
    min_spread_bps: Decimal,
    tick: Price,
) -> (Price, Price) {
    let spread_bps = spread_bps.max(min_spread_bps);
    let half = spread_bps / BPS * mid / Decimal::TWO;

    let bid = Price::new(center - half).floor_to_tick(tick);
    let mut ask = Price::new(center + half).ceil_to_tick(tick);
    if ask <= bid {
        ask = bid + tick;
    }
    (bid, ask)
}

fn spread_of(bid: Price, ask: Price, mid: Decimal) -> Decimal {
    if mid.is_zero() {
        return Decimal::ZERO;
    }
    (ask.inner() - bid.inner()) / mid * BPS
}

/// Side whose next fill would push inventory past `max_position_usd`.
fn gated_side(inventory_usd: Decimal, order_size_usd: Decimal, max_position_usd: Decimal) -> Option<OrderSide> {
    if max_position_usd <= Decimal::ZERO {
        return None;
    }
    let buy_blocked = inventory_usd + order_size_usd > max_position_usd;
    let sell_blocked = inventory_usd - order_size_usd < -max_position_usd;
    match (buy_blocked, sell_blocked) {
        (true, false) => Some(OrderSide::Buy),
        (false, true) => Some(OrderSide::Sell),
        // Cap smaller than one order: keep only the reducing side.
        (true, true) if inventory_usd >= Decimal::ZERO => Some(OrderSide::Buy),
        (true, true) => Some(OrderSide::Sell),
        (false, false) => None,
    }
}

/// Calculate the quote for one cycle.
///
/// # Arguments
/// * `mid` - Current mid price (must be positive)
/// * `config` - Market maker configuration
/// * `inventory` - Current inventory state
/// * `spec` - Instrument tick/lot rules
pub fn compute_quote(
    mid: Price,
    config: &MarketMakerConfig,
    inventory: &InventoryState,
    spec: &InstrumentSpec,
) -> Quote {
    let mm = &config.market_making;
    let m = mid.inner();

    let skew = skew_bps(inventory.inventory_usd, mm.max_inventory_usd, mm.skew_per_100_usd);
    // Positive inventory shifts both quotes down.
    let center = m - skew / BPS * m;

    let (bid_price, ask_price) = priced_pair(
        m,
        center,
        mm.base_spread_bps,
        mm.min_spread_bps,
        spec.tick_size,
    );

    let levels = (1..mm.levels)
        .map(|i| {
            let level_spread = mm.base_spread_bps * Decimal::from(1 + i);
            let (bid, ask) = priced_pair(m, center, level_spread, mm.min_spread_bps, spec.tick_size);
            QuoteLevel {
                level: i,
                bid,
                ask,
                spread_bps: spread_of(bid, ask, m),
            }
        })
        .collect();

    Quote {
        bid_price,
        ask_price,
        size: Size::from_usd(mm.order_size_usd, mid).round_to_lot(spec.lot_size),
        spread_bps: spread_of(bid_price, ask_price, m),
        skew_bps: skew,
        suppressed: gated_side(
            inventory.inventory_usd,
            mm.order_size_usd,
            config.risk.max_position_usd,
        ),
        levels,
    }
}

/// Keep post-only quotes at least `min_edge_bps` away from the opposite
/// top of book. Only ever widens.
pub fn apply_book_guard(quote: &mut Quote, book: &SpreadSnapshot, min_edge_bps: Decimal, tick: Price) {
    let mut bid_cap = book.ask.offset_bps(-min_edge_bps).floor_to_tick(tick);
    if bid_cap >= book.ask {
        bid_cap = book.ask - tick;
    }
    let mut ask_floor = book.bid.offset_bps(min_edge_bps).ceil_to_tick(tick);
    if ask_floor <= book.bid {
        ask_floor = book.bid + tick;
    }

    quote.bid_price = quote.bid_price.min(bid_cap);
    quote.ask_price = quote.ask_price.max(ask_floor);
    for level in &mut quote.levels {
        level.bid = level.bid.min(bid_cap);
        level.ask = level.ask.max(ask_floor);
        level.spread_bps = spread_of(level.bid, level.ask, book.mid.inner());
    }
    quote.spread_bps = spread_of(quote.bid_price, quote.ask_price, book.mid.inner());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(levels: u32, max_position_usd: Decimal) -> MarketMakerConfig {
        MarketMakerConfig::from_json(&format!(
            r#"{{
                "name": "test",
                "symbol": "TEST",
                "market_making": {{
                    "base_spread_bps": 30,
                    "min_spread_bps": 15,
                    "order_size_usd": 50,
                    "max_inventory_usd": 300,
                    "levels": {levels},
                    "skew_per_100_usd": 5
                }},
                "risk": {{ "max_position_usd": {max_position_usd} }}
            }}"#
        ))
        .unwrap()
    }

    fn spec() -> InstrumentSpec {
        InstrumentSpec::new("TEST", Price::new(dec!(0.01)), Size::new(dec!(0.001)))
    }

    fn quote_at(mid: Decimal, inventory_usd: Decimal) -> Quote {
        compute_quote(
            Price::new(mid),
            &config(1, Decimal::ZERO),
            &InventoryState::with_inventory("TEST", inventory_usd),
            &spec(),
        )
    }

    #[test]
    fn test_documented_skew_example() {
        let q = quote_at(dec!(100), dec!(200));
        assert_eq!(q.skew_bps, dec!(10));
        // Both sides sit 0.10 below the unskewed 99.85 / 100.15.
        assert_eq!(q.bid_price.inner(), dec!(99.75));
        assert_eq!(q.ask_price.inner(), dec!(100.05));
        assert_eq!(q.spread_bps, dec!(30));
        assert_eq!(q.size.inner(), dec!(0.5));
    }

    #[test]
    fn test_zero_inventory_is_symmetric() {
        let q = quote_at(dec!(100), Decimal::ZERO);
        assert_eq!(q.bid_price.inner(), dec!(99.85));
        assert_eq!(q.ask_price.inner(), dec!(100.15));
        assert_eq!(q.spread_bps, dec!(30));
    }

    #[test]
    fn test_skew_direction() {
        let neutral = quote_at(dec!(100), Decimal::ZERO);
        let long = quote_at(dec!(100), dec!(100));
        let short = quote_at(dec!(100), dec!(-100));

        assert!(long.bid_price < neutral.bid_price);
        assert!(long.ask_price < neutral.ask_price);
        assert!(short.bid_price > neutral.bid_price);
        assert!(short.ask_price > neutral.ask_price);
    }

    #[test]
    fn test_skew_clamped_at_max_inventory() {
        assert_eq!(quote_at(dec!(100), dec!(5000)).skew_bps, dec!(15));
        assert_eq!(quote_at(dec!(100), dec!(-5000)).skew_bps, dec!(-15));
    }

    #[test]
    fn test_spread_floor_holds_across_prices() {
        let mut cfg = config(1, Decimal::ZERO);
        cfg.market_making.base_spread_bps = dec!(15);
        for mid in [dec!(0.5), dec!(3.217), dec!(99.99), dec!(2500.5), dec!(64321.7)] {
            for inventory in [dec!(-300), dec!(-35), Decimal::ZERO, dec!(120), dec!(300)] {
                let q = compute_quote(
                    Price::new(mid),
                    &cfg,
                    &InventoryState::with_inventory("TEST", inventory),
                    &spec(),
                );
                assert!(q.ask_price > q.bid_price, "mid={mid} inv={inventory}");
                assert!(q.spread_bps >= dec!(15), "mid={mid} inv={inventory}");
            }
        }
    }

    #[test]
    fn test_coarse_tick_never_collapses_pair() {
        let coarse = InstrumentSpec::new("TEST", Price::new(dec!(1)), Size::new(dec!(1)));
        let q = compute_quote(
            Price::new(dec!(100)),
            &config(1, Decimal::ZERO),
            &InventoryState::flat("TEST"),
            &coarse,
        );
        assert_eq!(q.bid_price.inner(), dec!(99));
        assert_eq!(q.ask_price.inner(), dec!(101));
    }

    #[test]
    fn test_side_gating_suppresses_increasing_side() {
        let cfg = config(1, dec!(250));
        let long = compute_quote(
            Price::new(dec!(100)),
            &cfg,
            &InventoryState::with_inventory("TEST", dec!(220)),
            &spec(),
        );
        assert_eq!(long.suppressed, Some(OrderSide::Buy));
        assert!(long.quotes_side(OrderSide::Sell));

        let short = compute_quote(
            Price::new(dec!(100)),
            &cfg,
            &InventoryState::with_inventory("TEST", dec!(-201)),
            &spec(),
        );
        assert_eq!(short.suppressed, Some(OrderSide::Sell));

        let inside = compute_quote(
            Price::new(dec!(100)),
            &cfg,
            &InventoryState::with_inventory("TEST", dec!(200)),
            &spec(),
        );
        assert_eq!(inside.suppressed, None);
    }

    #[test]
    fn test_ladder_levels_widen() {
        let q = compute_quote(
            Price::new(dec!(100)),
            &config(3, Decimal::ZERO),
            &InventoryState::flat("TEST"),
            &spec(),
        );
        assert_eq!(q.levels.len(), 2);
        assert_eq!(q.levels[0].spread_bps, dec!(60));
        assert_eq!(q.levels[1].spread_bps, dec!(90));
        assert!(q.levels[0].bid < q.bid_price);
        assert!(q.levels[1].ask > q.levels[0].ask);
    }

    #[test]
    fn test_book_guard_only_widens() {
        let mut q = quote_at(dec!(100), Decimal::ZERO);
        let before = q.clone();
        let book = SpreadSnapshot::from_bbo(Price::new(dec!(99.5)), Price::new(dec!(100.5))).unwrap();

        apply_book_guard(&mut q, &book, dec!(1), Price::new(dec!(0.01)));
        assert_eq!(q.bid_price, before.bid_price);
        assert_eq!(q.ask_price, before.ask_price);
    }

    #[test]
    fn test_book_guard_pulls_crossing_quotes_back() {
        // Short inventory lifts the bid to 100.00, onto a 99.99 / 100.01 book.
        let mut q = quote_at(dec!(100), dec!(-300));
        assert_eq!(q.bid_price.inner(), dec!(100));
        let book = SpreadSnapshot::from_bbo(Price::new(dec!(99.99)), Price::new(dec!(100.01))).unwrap();

        apply_book_guard(&mut q, &book, dec!(2), Price::new(dec!(0.01)));
        assert_eq!(q.bid_price.inner(), dec!(99.98));
        assert_eq!(q.ask_price.inner(), dec!(100.30));
        assert!(q.spread_bps > dec!(30));
    }

    #[test]
    fn test_book_guard_zero_edge_stays_off_touch() {
        let mut q = quote_at(dec!(100), dec!(300));
        let book = SpreadSnapshot::from_bbo(Price::new(dec!(99.60)), Price::new(dec!(99.70))).unwrap();

        apply_book_guard(&mut q, &book, Decimal::ZERO, Price::new(dec!(0.01)));
        assert_eq!(q.bid_price.inner(), dec!(99.69));
    }
}

//! Entry sizing.
//!
//! `usd = equity * size_pct / 100`. Leverage is set on the exchange, so the
//! notional is never multiplied here.

use perp_core::{InstrumentSpec, Price, Size};
use rust_decimal::Decimal;

use crate::signal::Signal;

pub const BELOW_MINIMUM_SIZE: &str = "below minimum size";

pub struct PositionSizer {
    size_pct: Decimal,
}

impl PositionSizer {
    pub fn new(size_pct: Decimal) -> Self {
        Self { size_pct }
    }

    pub fn notional(&self, equity: Decimal) -> Decimal {
        equity * self.size_pct / Decimal::ONE_HUNDRED
    }

    /// Attach size and notional to an entry signal.
    ///
    /// Non-entries pass through unchanged. An entry whose notional, or
    /// lot-rounded size, does not exceed the instrument minimum becomes a
    /// hold.
    pub fn size(&self, signal: Signal, equity: Decimal, mark: Price, spec: &InstrumentSpec) -> Signal {
        if !signal.action.is_entry() {
            return signal;
        }

        let usd = self.notional(equity);
        let size = Size::from_usd(usd, mark).round_to_lot(spec.lot_size);
        if usd <= spec.min_notional || size.notional(mark) <= spec.min_notional {
            let mut hold = signal.into_hold(BELOW_MINIMUM_SIZE);
            hold.usd = Some(usd);
            return hold;
        }

        Signal {
            size: Some(size),
            usd: Some(usd),
            ..signal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalAction;
    use rust_decimal_macros::dec;

    fn entry() -> Signal {
        Signal {
            symbol: "ETH".into(),
            action: SignalAction::Long,
            size: None,
            usd: None,
            reason: "rsi 25.00 <= long entry 30".into(),
            confidence: 0.75,
            rsi: Some(25.0),
        }
    }

    fn spec() -> InstrumentSpec {
        InstrumentSpec::new("ETH", Price::new(dec!(0.01)), Size::new(dec!(0.001)))
    }

    #[test]
    fn test_sizes_entry_from_equity() {
        let sizer = PositionSizer::new(dec!(10));
        let signal = sizer.size(entry(), dec!(1000), Price::new(dec!(2000)), &spec());

        assert_eq!(signal.action, SignalAction::Long);
        assert_eq!(signal.usd, Some(dec!(100)));
        assert_eq!(signal.size, Some(Size::new(dec!(0.05))));
    }

    #[test]
    fn test_below_minimum_becomes_hold() {
        let sizer = PositionSizer::new(dec!(0.5));
        let signal = sizer.size(entry(), dec!(1000), Price::new(dec!(2000)), &spec());

        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.reason, BELOW_MINIMUM_SIZE);
        assert_eq!(signal.usd, Some(dec!(5)));
        assert_eq!(signal.rsi, Some(25.0));
    }

    #[test]
    fn test_notional_at_minimum_becomes_hold() {
        let sizer = PositionSizer::new(dec!(100));
        let signal = sizer.size(entry(), dec!(10), Price::new(dec!(1)), &spec());

        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.reason, BELOW_MINIMUM_SIZE);

        let signal = sizer.size(entry(), dec!(10.01), Price::new(dec!(1)), &spec());
        assert_eq!(signal.action, SignalAction::Long);
        assert_eq!(signal.size, Some(Size::new(dec!(10.01))));
    }

    #[test]
    fn test_hold_passes_through() {
        let sizer = PositionSizer::new(dec!(10));
        let hold = Signal::hold("ETH", Some(50.0), "inside thresholds");
        assert_eq!(
            sizer.size(hold.clone(), dec!(1000), Price::new(dec!(2000)), &spec()),
            hold
        );
    }
}

//! RSI signal engine.
//!
//! Turns an RSI reading plus the current position into one `Signal`:
//! - open position: stop-loss, then take-profit, then RSI reversal, else hold
//! - no position: entry at the configured thresholds (inclusive), subject to
//!   the position limit

use perp_core::{OrderSide, Position, Price, Size};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{Eligibility, SignalParams, StrategyRiskParams};
use crate::rsi::{REVERSAL_LONG_EXIT, REVERSAL_SHORT_EXIT};

/// Distance past a threshold (in RSI points) that earns full confidence.
const FULL_CONFIDENCE_DISTANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Long,
    Short,
    Close,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Close => "close",
            Self::Hold => "hold",
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Long | Self::Short)
    }

    /// Order side for an entry.
    pub fn entry_side(&self) -> Option<OrderSide> {
        match self {
            Self::Long => Some(OrderSide::Buy),
            Self::Short => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trading decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: SignalAction,
    /// Entry size after sizing, or the position size for a close.
    pub size: Option<Size>,
    /// Entry notional after sizing.
    pub usd: Option<Decimal>,
    pub reason: String,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub rsi: Option<f64>,
}

impl Signal {
    pub fn hold(symbol: &str, rsi: Option<f64>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: SignalAction::Hold,
            size: None,
            usd: None,
            reason: reason.into(),
            confidence: 0.0,
            rsi,
        }
    }

    fn new(symbol: &str, action: SignalAction, rsi: f64, confidence: f64, reason: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            action,
            size: None,
            usd: None,
            reason,
            confidence,
            rsi: Some(rsi),
        }
    }

    /// Downgrade to hold, keeping the RSI reading.
    pub fn into_hold(self, reason: impl Into<String>) -> Self {
        Self::hold(&self.symbol, self.rsi, reason)
    }
}

fn distance_confidence(distance: f64) -> f64 {
    0.5 + 0.5 * (distance.max(0.0) / FULL_CONFIDENCE_DISTANCE).min(1.0)
}

/// Everything the engine needs to judge one asset.
#[derive(Debug, Clone, Copy)]
pub struct AssetView<'a> {
    pub symbol: &'a str,
    pub eligibility: Eligibility,
    pub rsi: f64,
    pub mark: Price,
    pub position: Option<&'a Position>,
    /// Open positions across the account, including ones entered earlier
    /// in the same cycle.
    pub open_positions: usize,
}

pub struct SignalEngine {
    params: SignalParams,
    risk: StrategyRiskParams,
}

impl SignalEngine {
    pub fn new(params: SignalParams, risk: StrategyRiskParams) -> Self {
        Self { params, risk }
    }

    pub fn evaluate(&self, view: &AssetView<'_>) -> Signal {
        match view.position.filter(|p| !p.is_flat()) {
            Some(position) => self.evaluate_exit(view, position),
            None => self.evaluate_entry(view),
        }
    }

    fn evaluate_exit(&self, view: &AssetView<'_>, position: &Position) -> Signal {
        let pnl_pct = position.pnl_pct(view.mark);
        let is_long = position.size > Decimal::ZERO;
        let rsi = view.rsi;

        let close = |confidence: f64, reason: String| {
            let mut signal = Signal::new(view.symbol, SignalAction::Close, rsi, confidence, reason);
            signal.size = Some(Size::new(position.size.abs()));
            signal
        };

        let stop = self.risk.stop_loss_pct;
        if stop > Decimal::ZERO && pnl_pct <= -stop {
            return close(
                1.0,
                format!("stop loss: pnl {:.2}% <= -{stop}%", pnl_pct.to_f64().unwrap_or(0.0)),
            );
        }

        let take = self.risk.take_profit_pct;
        if take > Decimal::ZERO && pnl_pct >= take {
            return close(
                1.0,
                format!("take profit: pnl {:.2}% >= {take}%", pnl_pct.to_f64().unwrap_or(0.0)),
            );
        }

        if is_long && rsi >= REVERSAL_LONG_EXIT {
            return close(
                distance_confidence(rsi - REVERSAL_LONG_EXIT),
                format!("rsi reversal: {rsi:.2} >= {REVERSAL_LONG_EXIT}"),
            );
        }
        if !is_long && rsi <= REVERSAL_SHORT_EXIT {
            return close(
                distance_confidence(REVERSAL_SHORT_EXIT - rsi),
                format!("rsi reversal: {rsi:.2} <= {REVERSAL_SHORT_EXIT}"),
            );
        }

        let side = if is_long { "long" } else { "short" };
        Signal::hold(
            view.symbol,
            Some(rsi),
            format!("holding {side}: rsi {rsi:.2}, pnl {:.2}%", pnl_pct.to_f64().unwrap_or(0.0)),
        )
    }

    fn evaluate_entry(&self, view: &AssetView<'_>) -> Signal {
        let rsi = view.rsi;
        let p = &self.params;

        let candidate = if view.eligibility.long && rsi <= p.long_entry {
            Signal::new(
                view.symbol,
                SignalAction::Long,
                rsi,
                distance_confidence(p.long_entry - rsi),
                format!("rsi {rsi:.2} <= long entry {}", p.long_entry),
            )
        } else if view.eligibility.short && rsi >= p.short_entry {
            Signal::new(
                view.symbol,
                SignalAction::Short,
                rsi,
                distance_confidence(rsi - p.short_entry),
                format!("rsi {rsi:.2} >= short entry {}", p.short_entry),
            )
        } else {
            return Signal::hold(view.symbol, Some(rsi), format!("rsi {rsi:.2} inside thresholds"));
        };

        if view.open_positions >= self.risk.max_positions {
            return candidate.into_hold(format!(
                "max positions reached ({}/{})",
                view.open_positions, self.risk.max_positions
            ));
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BOTH: Eligibility = Eligibility {
        long: true,
        short: true,
    };
    const LONG_ONLY: Eligibility = Eligibility {
        long: true,
        short: false,
    };

    fn engine() -> SignalEngine {
        SignalEngine::new(
            SignalParams::default(),
            StrategyRiskParams {
                stop_loss_pct: dec!(5),
                take_profit_pct: dec!(10),
                max_positions: 2,
            },
        )
    }

    fn view<'a>(rsi: f64, position: Option<&'a Position>, mark: Decimal) -> AssetView<'a> {
        AssetView {
            symbol: "ETH",
            eligibility: BOTH,
            rsi,
            mark: Price::new(mark),
            position,
            open_positions: usize::from(position.is_some()),
        }
    }

    #[test]
    fn test_long_entry_is_inclusive() {
        let e = engine();
        assert_eq!(e.evaluate(&view(30.0, None, dec!(100))).action, SignalAction::Long);
        assert_eq!(e.evaluate(&view(29.8, None, dec!(100))).action, SignalAction::Long);
        assert_eq!(e.evaluate(&view(30.2, None, dec!(100))).action, SignalAction::Hold);
        assert_eq!(e.evaluate(&view(31.0, None, dec!(100))).action, SignalAction::Hold);
    }

    #[test]
    fn test_short_entry_needs_eligibility() {
        let e = engine();
        assert_eq!(e.evaluate(&view(70.0, None, dec!(100))).action, SignalAction::Short);

        let mut v = view(85.0, None, dec!(100));
        v.eligibility = LONG_ONLY;
        assert_eq!(e.evaluate(&v).action, SignalAction::Hold);
    }

    #[test]
    fn test_entry_confidence_scales_with_distance() {
        let e = engine();
        let at = e.evaluate(&view(30.0, None, dec!(100)));
        let deep = e.evaluate(&view(15.0, None, dec!(100)));
        let mid = e.evaluate(&view(25.0, None, dec!(100)));
        assert_eq!(at.confidence, 0.5);
        assert_eq!(deep.confidence, 1.0);
        assert!((mid.confidence - 0.75).abs() < 1e-12);
        assert_eq!(e.evaluate(&view(50.0, None, dec!(100))).confidence, 0.0);
    }

    #[test]
    fn test_exit_priority_stop_before_reversal() {
        let e = engine();
        let long = Position::new("ETH", dec!(1), Price::new(dec!(100)));

        // -6% and RSI reversed: stop loss wins.
        let signal = e.evaluate(&view(75.0, Some(&long), dec!(94)));
        assert_eq!(signal.action, SignalAction::Close);
        assert_eq!(signal.confidence, 1.0);
        assert!(signal.reason.starts_with("stop loss"));
        assert_eq!(signal.size, Some(Size::new(dec!(1))));
    }

    #[test]
    fn test_take_profit_and_reversal() {
        let e = engine();
        let long = Position::new("ETH", dec!(1), Price::new(dec!(100)));

        let tp = e.evaluate(&view(50.0, Some(&long), dec!(110)));
        assert!(tp.reason.starts_with("take profit"));

        let reversal = e.evaluate(&view(72.0, Some(&long), dec!(102)));
        assert_eq!(reversal.action, SignalAction::Close);
        assert!(reversal.reason.starts_with("rsi reversal"));
        assert!((reversal.confidence - 0.6).abs() < 1e-12);

        let hold = e.evaluate(&view(69.9, Some(&long), dec!(102)));
        assert_eq!(hold.action, SignalAction::Hold);
    }

    #[test]
    fn test_short_reversal_uses_fixed_threshold() {
        let e = engine();
        let short = Position::new("ETH", dec!(-2), Price::new(dec!(100)));

        let signal = e.evaluate(&view(30.0, Some(&short), dec!(99)));
        assert_eq!(signal.action, SignalAction::Close);
        assert_eq!(signal.size, Some(Size::new(dec!(2))));

        // Short losing 6% hits the stop.
        let stop = e.evaluate(&view(50.0, Some(&short), dec!(106)));
        assert!(stop.reason.starts_with("stop loss"));
    }

    #[test]
    fn test_existing_position_never_adds() {
        let e = engine();
        let long = Position::new("ETH", dec!(1), Price::new(dec!(100)));
        let signal = e.evaluate(&view(10.0, Some(&long), dec!(100)));
        assert_eq!(signal.action, SignalAction::Hold);
    }

    #[test]
    fn test_position_limit_downgrades_entry() {
        let e = engine();
        let mut v = view(20.0, None, dec!(100));
        v.open_positions = 2;
        let signal = e.evaluate(&v);
        assert_eq!(signal.action, SignalAction::Hold);
        assert!(signal.reason.contains("max positions"));
        assert_eq!(signal.rsi, Some(20.0));
    }
}

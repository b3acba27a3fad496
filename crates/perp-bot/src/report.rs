//! Command output.

use std::fmt;

use perp_core::{Order, Position, Price, SpreadSnapshot};
use perp_mm::{LoopSummary, MakerCycleResult};
use perp_strategy::{StrategyCycleResult, StrategyLoopSummary};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PriceReport {
    pub symbol: String,
    pub book: SpreadSnapshot,
}

impl fmt::Display for PriceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} bid {}  ask {}  mid {}  spread {} bps",
            self.symbol,
            self.book.bid,
            self.book.ask,
            self.book.mid,
            self.book.spread_bps.round_dp(2)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionRow {
    pub symbol: String,
    pub size: Decimal,
    pub entry_price: Price,
    pub leverage: u32,
    /// `None` when the mark could not be fetched.
    pub mark: Option<Price>,
    pub unrealized_pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
}

impl PositionRow {
    pub fn new(position: &Position, mark: Option<Price>) -> Self {
        Self {
            symbol: position.symbol.clone(),
            size: position.size,
            entry_price: position.entry_price,
            leverage: position.leverage,
            mark,
            unrealized_pnl: mark.map(|m| position.unrealized_pnl(m)),
            pnl_pct: mark.map(|m| position.pnl_pct(m)),
        }
    }
}

impl fmt::Display for PositionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.size > Decimal::ZERO { "LONG" } else { "SHORT" };
        write!(
            f,
            "{:<8} {:<5} {:>12} @ {:<12} {}x",
            self.symbol,
            side,
            self.size.abs(),
            self.entry_price,
            self.leverage
        )?;
        match (self.mark, self.unrealized_pnl, self.pnl_pct) {
            (Some(mark), Some(pnl), Some(pct)) => write!(
                f,
                "  mark {mark}  upnl {}  ({}%)",
                pnl.round_dp(2),
                pct.round_dp(2)
            ),
            _ => write!(f, "  mark unavailable"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionsReport {
    pub rows: Vec<PositionRow>,
}

impl fmt::Display for PositionsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "No open positions");
        }
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

fn write_order(f: &mut fmt::Formatter<'_>, order: &Order) -> fmt::Result {
    let px = order
        .fill_price
        .or(order.price)
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    write!(
        f,
        "{:<8} {:<4} {:>12} @ {:<12} {:<4} {:?} {}",
        order.symbol, order.side, order.size, px, order.tif, order.status, order.cloid
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct OrdersReport {
    pub orders: Vec<Order>,
}

impl fmt::Display for OrdersReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.orders.is_empty() {
            return write!(f, "No open orders");
        }
        for (i, order) in self.orders.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_order(f, order)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub equity: Decimal,
    pub positions: PositionsReport,
    pub open_orders: usize,
    pub book: Option<PriceReport>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Equity:      {}", self.equity.round_dp(2))?;
        writeln!(f, "Open orders: {}", self.open_orders)?;
        if let Some(book) = &self.book {
            writeln!(f, "{book}")?;
        }
        write!(f, "{}", self.positions)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeReport {
    pub action: String,
    pub orders: Vec<Order>,
    pub cancelled: usize,
}

impl fmt::Display for TradeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} order(s)", self.action, self.orders.len())?;
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        for order in &self.orders {
            writeln!(f)?;
            write!(f, "  ")?;
            write_order(f, order)?;
        }
        Ok(())
    }
}

/// Outcome of one config passed to `run`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    MakerCycle {
        config: String,
        result: MakerCycleResult,
    },
    MakerLoop {
        config: String,
        summary: LoopSummary,
    },
    StrategyCycle {
        config: String,
        result: StrategyCycleResult,
    },
    StrategyLoop {
        config: String,
        summary: StrategyLoopSummary,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<RunOutcome>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.outcomes).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

//! Daily PnL tracking with UTC day rollover.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;

/// Equity baseline for the current UTC day.
///
/// The baseline is the first equity observed on a day; the rollover is
/// detected lazily on the first observation after midnight.
#[derive(Debug, Clone, Default)]
pub struct DailyPnlTracker {
    day: Option<NaiveDate>,
    start_equity: Decimal,
}

impl DailyPnlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an equity observation and return today's PnL.
    pub fn observe(&mut self, now: DateTime<Utc>, equity: Decimal) -> Decimal {
        let today = now.date_naive();
        if self.day != Some(today) {
            if let Some(previous) = self.day {
                info!(
                    %previous,
                    %today,
                    closing_pnl = %(equity - self.start_equity),
                    "UTC day rollover, resetting daily PnL baseline"
                );
            }
            self.day = Some(today);
            self.start_equity = equity;
        }
        equity - self.start_equity
    }

    pub fn start_equity(&self) -> Option<Decimal> {
        self.day.map(|_| self.start_equity)
    }
}

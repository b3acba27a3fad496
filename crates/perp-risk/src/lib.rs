//! Risk gating for perpbot.
//!
//! - `RiskGuard`: inventory, stop-loss and daily-loss rules evaluated every cycle
//! - `DailyPnlTracker`: equity baseline per UTC day

pub mod daily_pnl;
pub mod error;
pub mod guard;

pub use daily_pnl::DailyPnlTracker;
pub use error::{RiskError, RiskResult};
pub use guard::{Exposure, HaltCause, RiskGuard, RiskLimits, RiskVerdict};

//! RiskGuard: per-cycle trading gate.
//!
//! Evaluates the current exposure against inventory, stop-loss and
//! daily-loss limits. Rules are checked in a fixed order and the first
//! match decides the halt cause. A halted verdict is not latched: the next
//! cycle re-evaluates from fresh state.

use std::fmt;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RiskError, RiskResult};

// ============================================================================
// RiskLimits
// ============================================================================

/// Limits shared by the market maker and the strategy runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Absolute inventory at which quoting halts. Required.
    pub max_inventory_usd: Decimal,
    /// Position loss (percent of entry, unlevered) that halts. Zero disables.
    pub stop_loss_pct: Decimal,
    /// Daily loss in USD that halts. Zero disables.
    pub daily_loss_limit_usd: Decimal,
}

impl RiskLimits {
    pub fn validate(&self) -> RiskResult<()> {
        if self.max_inventory_usd <= Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "max_inventory_usd must be positive".to_string(),
            ));
        }
        if self.stop_loss_pct < Decimal::ZERO || self.daily_loss_limit_usd < Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "stop_loss_pct and daily_loss_limit_usd must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Exposure / Verdict
// ============================================================================

/// Snapshot of what the guard evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exposure {
    /// Signed inventory in USD.
    pub inventory_usd: Decimal,
    /// PnL percent of the open position, `None` when flat.
    pub position_pnl_pct: Option<Decimal>,
    /// Equity change since the start of the UTC day.
    pub daily_pnl: Decimal,
}

/// Why trading was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltCause {
    MaxInventory,
    StopLoss,
    DailyLossLimit,
}

impl HaltCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxInventory => "max_inventory",
            Self::StopLoss => "stop_loss",
            Self::DailyLossLimit => "daily_loss_limit",
        }
    }
}

impl fmt::Display for HaltCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gating decision for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "snake_case")]
pub enum RiskVerdict {
    Active,
    Halted(HaltCause),
}

impl RiskVerdict {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted(_))
    }

    pub fn cause(&self) -> Option<HaltCause> {
        match self {
            Self::Active => None,
            Self::Halted(cause) => Some(*cause),
        }
    }
}

impl fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Halted(cause) => write!(f, "HALTED({cause})"),
        }
    }
}

// ============================================================================
// RiskGuard
// ============================================================================

/// Stateless rule evaluation plus transition logging.
pub struct RiskGuard {
    limits: RiskLimits,
    /// Last verdict, for logging transitions only.
    last: RwLock<RiskVerdict>,
}

impl RiskGuard {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            last: RwLock::new(RiskVerdict::Active),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Pure rule check, first match wins.
    pub fn check(&self, exposure: &Exposure) -> RiskVerdict {
        let limits = &self.limits;

        if exposure.inventory_usd.abs() >= limits.max_inventory_usd {
            return RiskVerdict::Halted(HaltCause::MaxInventory);
        }

        if limits.stop_loss_pct > Decimal::ZERO {
            if let Some(pnl_pct) = exposure.position_pnl_pct {
                if pnl_pct <= -limits.stop_loss_pct {
                    return RiskVerdict::Halted(HaltCause::StopLoss);
                }
            }
        }

        if limits.daily_loss_limit_usd > Decimal::ZERO
            && exposure.daily_pnl <= -limits.daily_loss_limit_usd
        {
            return RiskVerdict::Halted(HaltCause::DailyLossLimit);
        }

        RiskVerdict::Active
    }

    /// Check and log state transitions.
    pub fn evaluate(&self, symbol: &str, exposure: &Exposure) -> RiskVerdict {
        let verdict = self.check(exposure);
        let previous = std::mem::replace(&mut *self.last.write(), verdict);

        if verdict != previous {
            match verdict {
                RiskVerdict::Halted(cause) => warn!(
                    symbol,
                    %cause,
                    inventory_usd = %exposure.inventory_usd,
                    daily_pnl = %exposure.daily_pnl,
                    "Risk guard halted trading"
                ),
                RiskVerdict::Active => info!(symbol, "Risk guard resumed trading"),
            }
        }
        verdict
    }
}

//! RSI strategy runner for perpbot.
//!
//! - `rsi`: Wilder RSI over candle closes
//! - `SignalEngine`: entries, exits and the position limit
//! - `PositionSizer`: equity-percent sizing against the instrument minimum
//! - `StrategyLoop`: timeframe-gated evaluation with per-asset isolation
//! - `CycleObserver`: post-cycle event hooks

pub mod config;
pub mod error;
pub mod observer;
pub mod rsi;
pub mod signal;
pub mod sizer;
pub mod strategy_loop;

pub use config::{
    AssetSlot, Eligibility, PositionParams, SignalParams, StrategyConfig, StrategyFlags,
    StrategyRiskParams,
};
pub use error::{StrategyConfigError, StrategyError, StrategyResult};
pub use observer::{ChannelObserver, CycleObserver, LogObserver, StrategyEvent};
pub use rsi::wilder_rsi;
pub use signal::{AssetView, Signal, SignalAction, SignalEngine};
pub use sizer::{PositionSizer, BELOW_MINIMUM_SIZE};
pub use strategy_loop::{StrategyCycleResult, StrategyLoop, StrategyLoopSummary, StrategyStatus, Trade};

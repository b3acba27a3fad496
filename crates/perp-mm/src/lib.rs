//! Market making for perpbot.
//!
//! Quotes both sides of one symbol around the mid, skewing the quotes
//! against inventory and halting when a risk limit is hit.
//!
//! - `quote_engine`: pure quote computation and the post-only book guard
//! - `maker_loop`: the requote cycle and its run loop

pub mod config;
pub mod error;
pub mod inventory;
pub mod maker_loop;
pub mod quote_engine;

pub use config::{ExecutionParams, MakerFlags, MakerRiskParams, MarketMakerConfig, MarketMakingParams};
pub use error::{MakerConfigError, MakerError, MakerResult};
pub use inventory::InventoryState;
pub use maker_loop::{LoopSummary, MakerAction, MakerCycleResult, MakerStatus, MarketMakerLoop};
pub use quote_engine::{apply_book_guard, compute_quote, skew_bps, Quote, QuoteLevel};

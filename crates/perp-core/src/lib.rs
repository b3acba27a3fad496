//! Core domain types for perpbot.
//!
//! This crate provides fundamental types shared by the quoting and strategy engines:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Order`, `Position`, `SpreadSnapshot`, `InstrumentSpec`, `Candle`: Account and market data
//! - `OrderSide`, `TimeInForce`, `ClientOrderId`: Order enums and identifiers
//! - `Timeframe`, `Clock`: Scheduling primitives
//! - `CycleError`: Per-cycle failure record shared by both loops

pub mod clock;
pub mod cycle;
pub mod decimal;
pub mod error;
pub mod order;
pub mod timeframe;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cycle::{CycleError, ErrorKind};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use order::{ClientOrderId, Order, OrderSide, OrderStatus, TimeInForce};
pub use timeframe::Timeframe;
pub use types::{Candle, InstrumentSpec, Position, SpreadSnapshot};

//! Prometheus metrics and structured logging for perpbot.
//!
//! - `init_logging`: tracing subscriber (pretty in development, JSON in production)
//! - `Metrics`: counters and gauges for both loops

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;

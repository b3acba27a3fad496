use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Not one of the exchange interval strings.
    #[error("Unknown timeframe '{0}' (expected e.g. 1m, 15m, 1h, 4h, 1d)")]
    InvalidTimeframe(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

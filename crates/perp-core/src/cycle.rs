//! Per-cycle error records.
//!
//! Both loops catch failures at asset/order granularity and report them
//! in their cycle result instead of aborting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a caught per-cycle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    InsufficientFunds,
    Order,
    TransientNetwork,
    NotFound,
    InvalidRequest,
    /// Not enough data to evaluate (e.g. short candle history).
    Data,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Order => "order",
            Self::TransientNetwork => "transient_network",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failure recorded in a cycle result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleError {
    /// Symbol the failure belongs to, `None` for account-level reads.
    pub symbol: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl CycleError {
    pub fn new(symbol: Option<&str>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.map(str::to_string),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "[{symbol}] {}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

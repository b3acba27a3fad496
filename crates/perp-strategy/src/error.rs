//! Strategy error types.

use std::path::PathBuf;

use perp_gateway::GatewayError;
use thiserror::Error;

/// Invalid or unreadable strategy config. Fatal at load.
#[derive(Debug, Error)]
pub enum StrategyConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors that stop a strategy from starting.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Config(#[from] StrategyConfigError),

    #[error("Preflight failed for strategy {name}: {source}")]
    Preflight {
        name: String,
        #[source]
        source: GatewayError,
    },
}

pub type StrategyResult<T> = Result<T, StrategyError>;

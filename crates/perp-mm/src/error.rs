//! Market maker error types.

use std::path::PathBuf;

use perp_gateway::GatewayError;
use thiserror::Error;

/// Invalid or unreadable market maker config. Fatal at load.
#[derive(Debug, Error)]
pub enum MakerConfigError {
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

/// Errors that stop a market maker from starting.
#[derive(Debug, Error)]
pub enum MakerError {
    #[error(transparent)]
    Config(#[from] MakerConfigError),

    #[error("Preflight failed for {symbol}: {source}")]
    Preflight {
        symbol: String,
        #[source]
        source: GatewayError,
    },
}

pub type MakerResult<T> = Result<T, MakerError>;

//! Application error types.

use std::path::PathBuf;

use perp_gateway::GatewayError;
use perp_mm::{MakerConfigError, MakerError};
use perp_strategy::{StrategyConfigError, StrategyError};
use perp_telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Market maker config error: {0}")]
    MakerConfig(#[from] MakerConfigError),

    #[error("Market maker error: {0}")]
    Maker(#[from] MakerError),

    #[error("Strategy config error: {0}")]
    StrategyConfig(#[from] StrategyConfigError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Paper account {path}: {message}")]
    Account { path: PathBuf, message: String },

    #[error("Strategy run state {path}: {message}")]
    RunState { path: PathBuf, message: String },

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

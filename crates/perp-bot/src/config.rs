//! Application settings.
//!
//! TOML, resolved as: `--config` flag, then `PERPBOT_CONFIG`, then
//! `config/default.toml`. Every section may be omitted.

use std::path::PathBuf;

use perp_gateway::{ThrottleConfig, MAINNET_INFO_URL};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const CONFIG_ENV_VAR: &str = "PERPBOT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub paper: PaperSettings,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Public info endpoint used for market data.
    #[serde(default = "default_info_url")]
    pub info_url: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            info_url: default_info_url(),
        }
    }
}

/// Simulated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSettings {
    /// JSON file holding the account between runs.
    #[serde(default = "default_account_path")]
    pub account_path: PathBuf,
    /// Cash for a fresh account.
    #[serde(default = "default_starting_equity")]
    pub starting_equity: Decimal,
    /// Leverage set before manual trades.
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    /// JSON file with each strategy's last evaluation time.
    #[serde(default = "default_run_state_path")]
    pub run_state_path: PathBuf,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            account_path: default_account_path(),
            starting_equity: default_starting_equity(),
            default_leverage: default_leverage(),
            run_state_path: default_run_state_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// How often a looping strategy checks whether its timeframe elapsed.
    #[serde(default = "default_strategy_poll_sec")]
    pub strategy_poll_sec: f64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            strategy_poll_sec: default_strategy_poll_sec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Prometheus text snapshot written after `run`.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

fn default_info_url() -> String {
    MAINNET_INFO_URL.to_string()
}
fn default_account_path() -> PathBuf {
    PathBuf::from("data/paper_account.json")
}
fn default_run_state_path() -> PathBuf {
    PathBuf::from("data/strategy_runs.json")
}
fn default_starting_equity() -> Decimal {
    Decimal::new(10_000, 0)
}
fn default_leverage() -> u32 {
    1
}
fn default_strategy_poll_sec() -> f64 {
    30.0
}

impl AppSettings {
    /// Resolve the settings path from the flag and environment.
    pub fn resolve_path(flag: Option<String>) -> String {
        flag.or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings for the CLI.
    ///
    /// An explicitly named file must exist; the default path falls back to
    /// built-in defaults when absent.
    pub fn load(flag: Option<String>) -> AppResult<Self> {
        let explicit = flag.is_some() || std::env::var_os(CONFIG_ENV_VAR).is_some();
        let path = Self::resolve_path(flag);
        if explicit || std::path::Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network.info_url.trim().is_empty() {
            return Err(AppError::Config("network.info_url must not be empty".into()));
        }
        if self.paper.starting_equity <= Decimal::ZERO {
            return Err(AppError::Config("paper.starting_equity must be positive".into()));
        }
        if self.paper.default_leverage == 0 {
            return Err(AppError::Config("paper.default_leverage must be at least 1".into()));
        }
        if self.throttle.max_mutations_per_sec == 0 || self.throttle.max_reads_per_sec == 0 {
            return Err(AppError::Config("throttle limits must be at least 1".into()));
        }
        let poll = self.runtime.strategy_poll_sec;
        if !(poll.is_finite() && poll > 0.0) {
            return Err(AppError::Config("runtime.strategy_poll_sec must be positive".into()));
        }
        Ok(())
    }

    pub fn strategy_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.runtime.strategy_poll_sec)
    }
}

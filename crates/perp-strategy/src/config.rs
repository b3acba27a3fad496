//! RSI strategy configuration.
//!
//! Either a single `symbol` or a pair of disjoint `long_assets` /
//! `short_assets` lists. Loaded from JSON once and validated before use.

use std::collections::HashSet;
use std::path::Path;

use perp_core::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StrategyConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Single-symbol mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Multi-asset mode: long-only assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub long_assets: Vec<String>,
    /// Multi-asset mode: short-only assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_assets: Vec<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    #[serde(default)]
    pub signals: SignalParams,
    #[serde(default)]
    pub position: PositionParams,
    #[serde(default)]
    pub risk: StrategyRiskParams,
    #[serde(default)]
    pub flags: StrategyFlags,
}

/// RSI parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    #[serde(default = "default_period")]
    pub period: usize,
    /// Enter long at or below this RSI.
    #[serde(default = "default_long_entry")]
    pub long_entry: f64,
    /// Enter short at or above this RSI.
    #[serde(default = "default_short_entry")]
    pub short_entry: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            period: default_period(),
            long_entry: default_long_entry(),
            short_entry: default_short_entry(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionParams {
    /// Set on the exchange before each entry.
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Percent of equity committed per entry.
    #[serde(default = "default_size_pct")]
    pub size_pct: Decimal,
}

impl Default for PositionParams {
    fn default() -> Self {
        Self {
            leverage: default_leverage(),
            size_pct: default_size_pct(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRiskParams {
    /// Zero disables.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Zero disables.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
}

impl Default for StrategyRiskParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_positions: default_max_positions(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFlags {
    #[serde(default)]
    pub dry_run: bool,
    /// Single-symbol mode only.
    #[serde(default)]
    pub allow_shorts: bool,
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_timeframe() -> Timeframe {
    Timeframe::H1
}
/// Longest RSI lookback; the candle fetch is a small multiple of it.
pub const MAX_RSI_PERIOD: usize = 500;

fn default_period() -> usize {
    14
}
fn default_long_entry() -> f64 {
    30.0
}
fn default_short_entry() -> f64 {
    70.0
}
fn default_leverage() -> u32 {
    1
}
fn default_size_pct() -> Decimal {
    Decimal::new(10, 0) // 10% of equity
}
fn default_stop_loss_pct() -> Decimal {
    Decimal::new(5, 0)
}
fn default_take_profit_pct() -> Decimal {
    Decimal::new(10, 0)
}
fn default_max_positions() -> usize {
    3
}

/// Which entries an asset may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub long: bool,
    pub short: bool,
}

/// One asset to evaluate, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSlot {
    pub symbol: String,
    pub eligibility: Eligibility,
}

impl StrategyConfig {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, StrategyConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: &Path) -> Result<Self, StrategyConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| StrategyConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn is_multi_asset(&self) -> bool {
        self.symbol.is_none()
    }

    pub fn validate(&self) -> Result<(), StrategyConfigError> {
        let invalid = |msg: String| Err(StrategyConfigError::Invalid(msg));

        match &self.symbol {
            Some(symbol) if symbol.trim().is_empty() => {
                return invalid("symbol must not be empty".into());
            }
            Some(_) if !self.long_assets.is_empty() || !self.short_assets.is_empty() => {
                return invalid("use either symbol or long_assets/short_assets, not both".into());
            }
            None if self.long_assets.is_empty() && self.short_assets.is_empty() => {
                return invalid("no symbol or assets configured".into());
            }
            _ => {}
        }

        let longs: HashSet<&str> = self.long_assets.iter().map(String::as_str).collect();
        if longs.len() != self.long_assets.len() {
            return invalid("long_assets contains duplicates".into());
        }
        let shorts: HashSet<&str> = self.short_assets.iter().map(String::as_str).collect();
        if shorts.len() != self.short_assets.len() {
            return invalid("short_assets contains duplicates".into());
        }
        if let Some(both) = longs.intersection(&shorts).next() {
            return invalid(format!("{both} is in both long_assets and short_assets"));
        }

        let s = &self.signals;
        if !(2..=MAX_RSI_PERIOD).contains(&s.period) {
            return invalid(format!(
                "period must be within 2..={MAX_RSI_PERIOD}, got {}",
                s.period
            ));
        }
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(s.long_entry) || !in_range(s.short_entry) {
            return invalid("entry thresholds must be within 0..=100".into());
        }
        if s.long_entry >= s.short_entry {
            return invalid(format!(
                "long_entry ({}) must be below short_entry ({})",
                s.long_entry, s.short_entry
            ));
        }

        if self.position.leverage == 0 {
            return invalid("leverage must be at least 1".into());
        }
        if self.position.size_pct <= Decimal::ZERO || self.position.size_pct > Decimal::ONE_HUNDRED {
            return invalid("size_pct must be within (0, 100]".into());
        }
        if self.risk.stop_loss_pct < Decimal::ZERO || self.risk.take_profit_pct < Decimal::ZERO {
            return invalid("stop_loss_pct and take_profit_pct must not be negative".into());
        }
        if self.risk.max_positions == 0 {
            return invalid("max_positions must be at least 1".into());
        }
        Ok(())
    }

    /// Assets in evaluation order: the single symbol, or long assets then
    /// short assets.
    pub fn assets(&self) -> Vec<AssetSlot> {
        if let Some(symbol) = &self.symbol {
            return vec![AssetSlot {
                symbol: symbol.clone(),
                eligibility: Eligibility {
                    long: true,
                    short: self.flags.allow_shorts,
                },
            }];
        }
        let longs = self.long_assets.iter().map(|s| AssetSlot {
            symbol: s.clone(),
            eligibility: Eligibility {
                long: true,
                short: false,
            },
        });
        let shorts = self.short_assets.iter().map(|s| AssetSlot {
            symbol: s.clone(),
            eligibility: Eligibility {
                long: false,
                short: true,
            },
        });
        longs.chain(shorts).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_single_symbol_with_defaults() {
        let config = StrategyConfig::from_json(r#"{"name":"eth-rsi","symbol":"ETH"}"#).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.timeframe, Timeframe::H1);
        assert_eq!(config.signals.period, 14);
        assert_eq!(config.position.size_pct, dec!(10));

        let assets = config.assets();
        assert_eq!(assets.len(), 1);
        assert!(assets[0].eligibility.long);
        assert!(!assets[0].eligibility.short);
    }

    #[test]
    fn test_multi_asset_order_and_eligibility() {
        let config = StrategyConfig::from_json(
            r#"{
                "name": "basket",
                "version": "2.1",
                "long_assets": ["BTC", "ETH"],
                "short_assets": ["DOGE"],
                "timeframe": "15m",
                "signals": { "period": 10, "long_entry": 25, "short_entry": 75 },
                "position": { "leverage": 3, "size_pct": 5 },
                "risk": { "stop_loss_pct": 4, "take_profit_pct": 8, "max_positions": 2 },
                "flags": { "dry_run": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.timeframe, Timeframe::M15);
        let symbols: Vec<_> = config.assets().into_iter().map(|a| a.symbol).collect();
        assert_eq!(symbols, vec!["BTC", "ETH", "DOGE"]);
        let doge = &config.assets()[2];
        assert!(doge.eligibility.short && !doge.eligibility.long);
    }

    #[test]
    fn test_overlapping_assets_rejected() {
        let err = StrategyConfig::from_json(
            r#"{"name":"x","long_assets":["BTC"],"short_assets":["BTC"]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_symbol_and_assets_rejected() {
        assert!(StrategyConfig::from_json(
            r#"{"name":"x","symbol":"ETH","long_assets":["BTC"]}"#
        )
        .is_err());
        assert!(StrategyConfig::from_json(r#"{"name":"x"}"#).is_err());
    }

    #[test]
    fn test_threshold_validation() {
        let mut config = StrategyConfig::from_json(r#"{"name":"x","symbol":"ETH"}"#).unwrap();
        config.signals.long_entry = 70.0;
        config.signals.short_entry = 30.0;
        assert!(config.validate().is_err());

        config.signals.long_entry = 30.0;
        config.signals.short_entry = 70.0;
        config.signals.period = 1;
        assert!(config.validate().is_err());

        config.signals.period = MAX_RSI_PERIOD;
        assert!(config.validate().is_ok());
        config.signals.period = MAX_RSI_PERIOD + 1;
        assert!(config.validate().unwrap_err().to_string().contains("period"));
    }

    #[test]
    fn test_unknown_timeframe_rejected() {
        assert!(matches!(
            StrategyConfig::from_json(r#"{"name":"x","symbol":"ETH","timeframe":"7m"}"#),
            Err(StrategyConfigError::Parse(_))
        ));
    }
}

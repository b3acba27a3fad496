//! Market making configuration.
//!
//! Loaded from a JSON file once at startup and validated before the loop
//! starts. Every section except `market_making` may be omitted.

use std::path::Path;
use std::time::Duration;

use perp_risk::RiskLimits;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MakerConfigError;

/// Market maker configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    /// Display name used in logs and metrics.
    pub name: String,
    /// Symbol to quote (e.g. "ETH").
    pub symbol: String,
    pub market_making: MarketMakingParams,
    #[serde(default)]
    pub risk: MakerRiskParams,
    #[serde(default)]
    pub execution: ExecutionParams,
    #[serde(default)]
    pub flags: MakerFlags,
}

/// Spread, size and skew parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakingParams {
    /// Target quoted spread in basis points.
    #[serde(default = "default_base_spread_bps")]
    pub base_spread_bps: Decimal,

    /// Spread floor in basis points. Never quoted tighter than this.
    #[serde(default = "default_min_spread_bps")]
    pub min_spread_bps: Decimal,

    /// Size per side in USD.
    #[serde(default = "default_order_size_usd")]
    pub order_size_usd: Decimal,

    /// Absolute inventory at which quoting halts.
    #[serde(default = "default_max_inventory_usd")]
    pub max_inventory_usd: Decimal,

    /// Quote levels per side (1 = top level only).
    #[serde(default = "default_levels")]
    pub levels: u32,

    /// Skew in bps per $100 of inventory. Long inventory shifts both quotes down.
    #[serde(default = "default_skew_per_100_usd")]
    pub skew_per_100_usd: Decimal,

    /// Seconds between requotes. Fractions allowed.
    #[serde(default = "default_requote_interval_sec")]
    pub requote_interval_sec: f64,
}

/// Risk limits for the quoted symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerRiskParams {
    /// Inventory cap for side gating. A side whose next fill would push
    /// inventory past this is not quoted. Zero disables.
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: Decimal,

    /// Halt when the position loses this percent of entry. Zero disables.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    /// Halt when the day's equity loss reaches this. Zero disables.
    #[serde(default = "default_daily_loss_limit_usd")]
    pub daily_loss_limit_usd: Decimal,
}

impl Default for MakerRiskParams {
    fn default() -> Self {
        Self {
            max_position_usd: default_max_position_usd(),
            stop_loss_pct: default_stop_loss_pct(),
            daily_loss_limit_usd: default_daily_loss_limit_usd(),
        }
    }
}

/// Order placement parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Use add-liquidity-only orders.
    #[serde(default = "default_true")]
    pub post_only: bool,

    /// Minimum distance from the opposite top of book, in bps.
    #[serde(default = "default_min_edge_bps")]
    pub min_edge_bps: Decimal,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            post_only: true,
            min_edge_bps: default_min_edge_bps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerFlags {
    /// Compute quotes but send nothing.
    #[serde(default)]
    pub dry_run: bool,

    /// Log every computed quote at info level.
    #[serde(default = "default_true")]
    pub log_quotes: bool,
}

impl Default for MakerFlags {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_quotes: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_base_spread_bps() -> Decimal {
    Decimal::new(30, 0) // 30 bps
}
fn default_min_spread_bps() -> Decimal {
    Decimal::new(10, 0) // 10 bps
}
fn default_order_size_usd() -> Decimal {
    Decimal::new(50, 0) // $50 per side
}
fn default_max_inventory_usd() -> Decimal {
    Decimal::new(500, 0)
}
fn default_levels() -> u32 {
    1
}
fn default_skew_per_100_usd() -> Decimal {
    Decimal::new(5, 0) // 5 bps per $100
}
fn default_requote_interval_sec() -> f64 {
    5.0
}
fn default_max_position_usd() -> Decimal {
    Decimal::ZERO // side gating off
}
fn default_stop_loss_pct() -> Decimal {
    Decimal::new(5, 0) // 5%
}
fn default_daily_loss_limit_usd() -> Decimal {
    Decimal::new(100, 0)
}
fn default_min_edge_bps() -> Decimal {
    Decimal::ONE
}

impl MarketMakerConfig {
    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, MakerConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: &Path) -> Result<Self, MakerConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| MakerConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), MakerConfigError> {
        let mm = &self.market_making;
        let invalid = |msg: &str| Err(MakerConfigError::Invalid(msg.to_string()));

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty");
        }
        if mm.base_spread_bps <= Decimal::ZERO {
            return invalid("base_spread_bps must be positive");
        }
        if mm.min_spread_bps < Decimal::ZERO {
            return invalid("min_spread_bps must not be negative");
        }
        if mm.min_spread_bps > mm.base_spread_bps {
            return Err(MakerConfigError::Invalid(format!(
                "min_spread_bps ({}) exceeds base_spread_bps ({})",
                mm.min_spread_bps, mm.base_spread_bps
            )));
        }
        if mm.order_size_usd <= Decimal::ZERO {
            return invalid("order_size_usd must be positive");
        }
        if mm.max_inventory_usd <= Decimal::ZERO {
            return invalid("max_inventory_usd must be positive");
        }
        if mm.levels == 0 {
            return invalid("levels must be at least 1");
        }
        if mm.skew_per_100_usd < Decimal::ZERO {
            return invalid("skew_per_100_usd must not be negative");
        }
        if mm.requote_interval_sec <= 0.0
            || Duration::try_from_secs_f64(mm.requote_interval_sec).is_err()
        {
            return invalid("requote_interval_sec must be a positive number of seconds");
        }
        // Outermost ladder level at full inventory must stay above zero.
        let widest_half_spread = mm.base_spread_bps * Decimal::from(mm.levels) / Decimal::TWO;
        let reach_bps = self.max_skew_bps() + widest_half_spread;
        if reach_bps >= Decimal::from(10_000) {
            return Err(MakerConfigError::Invalid(format!(
                "max skew plus half the widest spread is {reach_bps} bps; quotes would reach zero"
            )));
        }
        if self.execution.min_edge_bps < Decimal::ZERO {
            return invalid("min_edge_bps must not be negative");
        }
        if self.risk.max_position_usd < Decimal::ZERO {
            return invalid("max_position_usd must not be negative");
        }
        self.risk_limits()
            .validate()
            .map_err(|e| MakerConfigError::Invalid(e.to_string()))
    }

    /// Limits for the risk guard.
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_inventory_usd: self.market_making.max_inventory_usd,
            stop_loss_pct: self.risk.stop_loss_pct,
            daily_loss_limit_usd: self.risk.daily_loss_limit_usd,
        }
    }

    /// Skew at `max_inventory_usd`, the largest the quote engine applies.
    pub fn max_skew_bps(&self) -> Decimal {
        let mm = &self.market_making;
        mm.max_inventory_usd / Decimal::ONE_HUNDRED * mm.skew_per_100_usd
    }

    pub fn requote_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.market_making.requote_interval_sec)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FULL: &str = r#"{
        "name": "eth-mm",
        "symbol": "ETH",
        "market_making": {
            "base_spread_bps": 30,
            "min_spread_bps": 15,
            "order_size_usd": 50,
            "max_inventory_usd": 300,
            "levels": 2,
            "skew_per_100_usd": 5,
            "requote_interval_sec": 2.5
        },
        "risk": { "max_position_usd": 250, "stop_loss_pct": 2, "daily_loss_limit_usd": 40 },
        "execution": { "post_only": true, "min_edge_bps": 2 },
        "flags": { "dry_run": true, "log_quotes": false }
    }"#;

    #[test]
    fn test_parse_full_config() {
        let config = MarketMakerConfig::from_json(FULL).unwrap();
        assert_eq!(config.symbol, "ETH");
        assert_eq!(config.market_making.min_spread_bps, dec!(15));
        assert_eq!(config.market_making.levels, 2);
        assert_eq!(config.risk.max_position_usd, dec!(250));
        assert!(config.flags.dry_run);
        assert_eq!(config.requote_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let config = MarketMakerConfig::from_json(
            r#"{"name":"btc","symbol":"BTC","market_making":{"order_size_usd":100}}"#,
        )
        .unwrap();
        assert_eq!(config.market_making.base_spread_bps, dec!(30));
        assert_eq!(config.market_making.order_size_usd, dec!(100));
        assert_eq!(config.risk, MakerRiskParams::default());
        assert!(config.execution.post_only);
        assert!(!config.flags.dry_run);
        assert!(config.flags.log_quotes);
    }

    #[test]
    fn test_min_spread_above_base_rejected() {
        let mut config = MarketMakerConfig::from_json(FULL).unwrap();
        config.market_making.min_spread_bps = dec!(31);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_spread_bps"));
    }

    #[test]
    fn test_non_positive_fields_rejected() {
        let base = MarketMakerConfig::from_json(FULL).unwrap();

        let mut c = base.clone();
        c.market_making.order_size_usd = Decimal::ZERO;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.market_making.levels = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.market_making.requote_interval_sec = 0.0;
        assert!(c.validate().is_err());

        let mut c = base;
        c.symbol = " ".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_requote_interval_out_of_range_rejected() {
        let mut config = MarketMakerConfig::from_json(FULL).unwrap();
        config.market_making.requote_interval_sec = 1e30;
        assert!(config.validate().is_err());

        config.market_making.requote_interval_sec = f64::NAN;
        assert!(config.validate().is_err());

        config.market_making.requote_interval_sec = 0.05;
        assert!(config.validate().is_ok());
        assert_eq!(config.requote_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_skew_reaching_zero_rejected() {
        let mut config = MarketMakerConfig::from_json(FULL).unwrap();
        config.market_making.max_inventory_usd = dec!(3000);
        config.market_making.skew_per_100_usd = dec!(400);
        assert_eq!(config.max_skew_bps(), dec!(12000));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quotes would reach zero"));

        // 9960 + 30 * 2 / 2 = 9990 bps still leaves a positive bid.
        config.market_making.skew_per_100_usd = dec!(332);
        assert!(config.validate().is_ok());
        config.market_making.skew_per_100_usd = dec!(333);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = MarketMakerConfig::from_json(FULL).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(MarketMakerConfig::from_json(&json).unwrap(), config);
    }
}

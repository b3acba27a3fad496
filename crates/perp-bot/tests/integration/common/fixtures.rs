//! Config files and scratch directories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Per-test scratch directory, removed on drop.
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("perpbot-it-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, file: &str, content: &str) -> PathBuf {
        let path = self.dir.join(file);
        std::fs::write(&path, content).unwrap();
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// ETH market maker quoting 30 bps wide, $50 a side.
pub fn maker_config(dry_run: bool, requote_interval_sec: f64) -> String {
    format!(
        r#"{{
  "name": "it-mm",
  "symbol": "ETH",
  "market_making": {{
    "base_spread_bps": 30,
    "min_spread_bps": 15,
    "order_size_usd": 50,
    "max_inventory_usd": 300,
    "levels": 1,
    "skew_per_100_usd": 5,
    "requote_interval_sec": {requote_interval_sec}
  }},
  "risk": {{ "max_position_usd": 250, "stop_loss_pct": 2, "daily_loss_limit_usd": 40 }},
  "execution": {{ "post_only": true, "min_edge_bps": 1 }},
  "flags": {{ "dry_run": {dry_run}, "log_quotes": false }}
}}"#
    )
}

/// Hourly RSI(14) strategy on one symbol, 10% of equity at 3x.
pub fn strategy_config(symbol: &str, dry_run: bool) -> String {
    format!(
        r#"{{
  "name": "it-rsi",
  "symbol": "{symbol}",
  "timeframe": "1h",
  "signals": {{ "period": 14, "long_entry": 30, "short_entry": 70 }},
  "position": {{ "leverage": 3, "size_pct": 10 }},
  "risk": {{ "stop_loss_pct": 5, "take_profit_pct": 10, "max_positions": 1 }},
  "flags": {{ "dry_run": {dry_run}, "allow_shorts": true }}
}}"#
    )
}

/// Closes falling by one each bar, which puts RSI at zero.
pub fn falling_closes(count: usize, start: i64) -> Vec<rust_decimal::Decimal> {
    (0..count)
        .map(|i| rust_decimal::Decimal::from(start - i as i64))
        .collect()
}

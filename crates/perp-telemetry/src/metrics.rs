//! Prometheus metrics for perpbot.
//!
//! Covers both loops:
//! - Market-maker cycles, quoted spread and inventory
//! - Strategy cycles, signals and RSI
//! - Orders, risk halts and gateway errors
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup bug; it can only happen
//! during static initialization.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Market-maker cycles by outcome status.
pub static MM_CYCLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perp_mm_cycles_total",
        "Market-maker cycles by status",
        &["symbol", "status"]
    )
    .unwrap()
});

/// Strategy runs by outcome (evaluated/skipped).
pub static STRATEGY_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perp_strategy_runs_total",
        "Strategy runs by outcome",
        &["strategy", "outcome"]
    )
    .unwrap()
});

/// Orders sent to the gateway.
/// Labels: kind (quote/limit/market/close/cancel)
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perp_orders_total",
        "Orders sent to the gateway",
        &["symbol", "kind"]
    )
    .unwrap()
});

/// Risk guard halts.
pub static RISK_HALTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perp_risk_halts_total",
        "Cycles halted by the risk guard",
        &["symbol", "cause"]
    )
    .unwrap()
});

/// Signals produced by the signal engine.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perp_signals_total",
        "Signals produced",
        &["symbol", "action"]
    )
    .unwrap()
});

/// Caught gateway errors by kind.
pub static GATEWAY_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perp_gateway_errors_total",
        "Gateway errors caught in cycles",
        &["kind"]
    )
    .unwrap()
});

/// Last quoted spread in basis points.
pub static QUOTED_SPREAD_BPS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perp_quoted_spread_bps",
        "Last quoted spread in basis points",
        &["symbol"]
    )
    .unwrap()
});

/// Signed inventory in USD.
pub static INVENTORY_USD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perp_inventory_usd",
        "Signed inventory in USD",
        &["symbol"]
    )
    .unwrap()
});

/// Last computed RSI.
pub static RSI: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("perp_rsi", "Last computed RSI", &["symbol"]).unwrap()
});

/// Cycle wall time in milliseconds.
pub static CYCLE_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "perp_cycle_duration_ms",
        "Cycle duration in milliseconds",
        &["loop"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn mm_cycle(symbol: &str, status: &str) {
        MM_CYCLES_TOTAL.with_label_values(&[symbol, status]).inc();
    }

    pub fn strategy_run(strategy: &str, skipped: bool) {
        let outcome = if skipped { "skipped" } else { "evaluated" };
        STRATEGY_RUNS_TOTAL
            .with_label_values(&[strategy, outcome])
            .inc();
    }

    pub fn order_sent(symbol: &str, kind: &str) {
        ORDERS_TOTAL.with_label_values(&[symbol, kind]).inc();
    }

    pub fn risk_halt(symbol: &str, cause: &str) {
        RISK_HALTS_TOTAL.with_label_values(&[symbol, cause]).inc();
    }

    pub fn signal(symbol: &str, action: &str) {
        SIGNALS_TOTAL.with_label_values(&[symbol, action]).inc();
    }

    pub fn gateway_error(kind: &str) {
        GATEWAY_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn quoted_spread(symbol: &str, spread_bps: f64) {
        QUOTED_SPREAD_BPS.with_label_values(&[symbol]).set(spread_bps);
    }

    pub fn inventory(symbol: &str, inventory_usd: f64) {
        INVENTORY_USD.with_label_values(&[symbol]).set(inventory_usd);
    }

    pub fn rsi(symbol: &str, value: f64) {
        RSI.with_label_values(&[symbol]).set(value);
    }

    pub fn cycle_duration(loop_kind: &str, duration_ms: f64) {
        CYCLE_DURATION_MS
            .with_label_values(&[loop_kind])
            .observe(duration_ms);
    }

    /// Render the default registry in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Write a text-format snapshot to `path`.
    pub fn write_snapshot(path: &Path) -> TelemetryResult<()> {
        let text = Self::render()?;
        std::fs::write(path, text).map_err(|source| TelemetryError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = ORDERS_TOTAL.with_label_values(&["TEST", "quote"]).get();
        Metrics::order_sent("TEST", "quote");
        Metrics::order_sent("TEST", "quote");
        let after = ORDERS_TOTAL.with_label_values(&["TEST", "quote"]).get();
        assert_eq!(after - before, 2.0);
    }

    #[test]
    fn test_render_contains_recorded_series() {
        Metrics::quoted_spread("RENDER", 21.5);
        let text = Metrics::render().unwrap();
        assert!(text.contains("perp_quoted_spread_bps"));
        assert!(text.contains("RENDER"));
    }
}

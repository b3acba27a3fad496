//! Scheduled RSI strategy loop.
//!
//! `run` evaluates every configured asset at most once per timeframe
//! (unless forced), sizes entries, and sends orders through the gateway.
//! Failures are isolated per asset.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use perp_core::{Clock, CycleError, ErrorKind, Order, SystemClock};
use perp_gateway::{DynGateway, GatewayError, OrderAmount};
use perp_telemetry::Metrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AssetSlot, StrategyConfig};
use crate::error::{StrategyError, StrategyResult};
use crate::observer::{notify, CycleObserver};
use crate::rsi::wilder_rsi;
use crate::signal::{AssetView, Signal, SignalAction, SignalEngine};
use crate::sizer::PositionSizer;

/// Candles fetched per evaluation, as a multiple of the RSI period.
const CANDLE_HISTORY_FACTOR: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    /// Every asset evaluated.
    Completed,
    /// Some assets failed, others were evaluated.
    Partial,
    /// Nothing could be evaluated.
    Error,
    /// Gated by the timeframe.
    Skipped,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// An order sent for a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub action: SignalAction,
    pub order: Order,
    pub usd: Option<Decimal>,
}

/// Result of one `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCycleResult {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub status: StrategyStatus,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub dry_run: bool,
    pub equity: Option<Decimal>,
    pub signals: Vec<Signal>,
    pub trades: Vec<Trade>,
    pub errors: Vec<CycleError>,
    pub message: Option<String>,
}

impl StrategyCycleResult {
    fn new(timestamp: DateTime<Utc>, strategy: &str, dry_run: bool) -> Self {
        Self {
            timestamp,
            strategy: strategy.to_string(),
            status: StrategyStatus::Completed,
            skipped: false,
            skip_reason: None,
            dry_run,
            equity: None,
            signals: Vec::new(),
            trades: Vec::new(),
            errors: Vec::new(),
            message: None,
        }
    }

    /// Signals other than hold.
    pub fn actionable(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.action != SignalAction::Hold)
    }

    fn finish(&mut self) {
        if self.errors.is_empty() {
            self.status = StrategyStatus::Completed;
            return;
        }
        self.status = if self.signals.is_empty() {
            StrategyStatus::Error
        } else {
            StrategyStatus::Partial
        };
        self.message = Some(format!(
            "{} error(s), first: {}",
            self.errors.len(),
            self.errors[0]
        ));
    }
}

/// Totals over a `run_loop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyLoopSummary {
    pub name: String,
    pub ticks: u64,
    pub evaluated: u64,
    pub skipped: u64,
    pub signals: u64,
    pub trades: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StrategyLoopSummary {
    fn new(name: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            ticks: 0,
            evaluated: 0,
            skipped: 0,
            signals: 0,
            trades: 0,
            errors: 0,
            started_at,
            finished_at: None,
        }
    }

    fn record(&mut self, result: &StrategyCycleResult) {
        self.ticks += 1;
        if result.skipped {
            self.skipped += 1;
            return;
        }
        self.evaluated += 1;
        self.signals += result.actionable().count() as u64;
        self.trades += result.trades.len() as u64;
        self.errors += result.errors.len() as u64;
    }
}

fn gateway_error(symbol: Option<&str>, error: &GatewayError) -> CycleError {
    Metrics::gateway_error(error.kind().as_str());
    CycleError::new(symbol, error.kind(), error.to_string())
}

/// RSI strategy runner.
pub struct StrategyLoop {
    config: StrategyConfig,
    gateway: DynGateway,
    engine: SignalEngine,
    sizer: PositionSizer,
    clock: Arc<dyn Clock>,
    observers: Vec<Box<dyn CycleObserver>>,
    last_run: Option<DateTime<Utc>>,
}

impl StrategyLoop {
    pub fn new(config: StrategyConfig, gateway: DynGateway) -> Self {
        let engine = SignalEngine::new(config.signals.clone(), config.risk.clone());
        let sizer = PositionSizer::new(config.position.size_pct);
        Self {
            config,
            gateway,
            engine,
            sizer,
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
            last_run: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resume the timeframe gate from an earlier process.
    pub fn with_last_run(mut self, last_run: Option<DateTime<Utc>>) -> Self {
        self.last_run = last_run;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn CycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Time of the last non-skipped run.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    /// Evaluate all assets once.
    ///
    /// Without `force`, returns a skipped result (and touches nothing) until
    /// one timeframe has elapsed since the last evaluation.
    pub async fn run(&mut self, force: bool) -> StrategyCycleResult {
        let started = Instant::now();
        let now = self.clock.now();
        let mut result = StrategyCycleResult::new(now, &self.config.name, self.config.flags.dry_run);

        if let Some(reason) = self.skip_reason(now, force) {
            result.status = StrategyStatus::Skipped;
            result.skipped = true;
            result.skip_reason = Some(reason);
            Metrics::strategy_run(&self.config.name, true);
            notify(&self.observers, &result);
            return result;
        }
        self.last_run = Some(now);

        self.evaluate_all(&mut result).await;
        result.finish();

        Metrics::strategy_run(&self.config.name, false);
        Metrics::cycle_duration("strategy", started.elapsed().as_secs_f64() * 1000.0);
        if result.status == StrategyStatus::Error {
            warn!(
                strategy = %self.config.name,
                message = ?result.message,
                "Strategy cycle failed"
            );
        }
        notify(&self.observers, &result);
        result
    }

    fn skip_reason(&self, now: DateTime<Utc>, force: bool) -> Option<String> {
        if force {
            return None;
        }
        let last = self.last_run?;
        let next = last + self.config.timeframe.chrono_duration();
        (now < next).then(|| {
            format!(
                "timeframe {} not elapsed since {}, next run at {}",
                self.config.timeframe,
                last.format("%H:%M:%S"),
                next.format("%H:%M:%S")
            )
        })
    }

    async fn evaluate_all(&self, result: &mut StrategyCycleResult) {
        let equity = match self.gateway.equity().await {
            Ok(equity) => equity,
            Err(e) => {
                result.errors.push(gateway_error(None, &e));
                return;
            }
        };
        result.equity = Some(equity);

        let mut open_positions = match self.gateway.positions().await {
            Ok(positions) => positions.iter().filter(|p| !p.is_flat()).count(),
            Err(e) => {
                result.errors.push(gateway_error(None, &e));
                return;
            }
        };

        for slot in self.config.assets() {
            match self.evaluate_asset(&slot, equity, open_positions).await {
                Ok((signal, trade)) => {
                    Metrics::signal(&signal.symbol, signal.action.as_str());
                    match signal.action {
                        SignalAction::Long | SignalAction::Short => open_positions += 1,
                        SignalAction::Close if trade.is_some() => {
                            open_positions = open_positions.saturating_sub(1)
                        }
                        _ => {}
                    }
                    result.signals.push(signal);
                    result.trades.extend(trade);
                }
                Err(error) => {
                    warn!(symbol = %slot.symbol, %error, "Asset evaluation failed");
                    result.errors.push(error);
                }
            }
        }
    }

    async fn evaluate_asset(
        &self,
        slot: &AssetSlot,
        equity: Decimal,
        open_positions: usize,
    ) -> Result<(Signal, Option<Trade>), CycleError> {
        let symbol = slot.symbol.as_str();
        let period = self.config.signals.period;
        let gw = |e: GatewayError| gateway_error(Some(symbol), &e);

        let candles = self
            .gateway
            .candles(symbol, self.config.timeframe, (period + 1) * CANDLE_HISTORY_FACTOR)
            .await
            .map_err(gw)?;
        let closes: Vec<f64> = candles
            .iter()
            .filter_map(|c| c.close.inner().to_f64())
            .collect();
        let rsi = wilder_rsi(&closes, period).ok_or_else(|| {
            CycleError::new(
                Some(symbol),
                ErrorKind::Data,
                format!("need {} closes for RSI({period}), got {}", period + 1, closes.len()),
            )
        })?;
        Metrics::rsi(symbol, rsi);

        let mark = self.gateway.price(symbol).await.map_err(gw)?;
        let position = self.gateway.position(symbol).await.map_err(gw)?;
        let spec = self.gateway.instrument(symbol).await.map_err(gw)?;

        let signal = self.engine.evaluate(&AssetView {
            symbol,
            eligibility: slot.eligibility,
            rsi,
            mark,
            position: position.as_ref(),
            open_positions,
        });
        let signal = self.sizer.size(signal, equity, mark, &spec);
        debug!(
            symbol,
            rsi,
            action = %signal.action,
            reason = %signal.reason,
            "Asset evaluated"
        );

        if self.config.flags.dry_run {
            return Ok((signal, None));
        }
        let trade = self.execute(&signal).await?;
        Ok((signal, trade))
    }

    async fn execute(&self, signal: &Signal) -> Result<Option<Trade>, CycleError> {
        let symbol = signal.symbol.as_str();
        let gw = |e: GatewayError| gateway_error(Some(symbol), &e);

        let order = match signal.action {
            SignalAction::Long | SignalAction::Short => {
                let Some(usd) = signal.usd else {
                    return Ok(None);
                };
                self.gateway
                    .set_leverage(symbol, self.config.position.leverage)
                    .await
                    .map_err(gw)?;
                let amount = OrderAmount::Usd(usd);
                let order = if signal.action == SignalAction::Long {
                    self.gateway.buy(symbol, amount, None).await
                } else {
                    self.gateway.sell(symbol, amount, None).await
                }
                .map_err(gw)?;
                Metrics::order_sent(symbol, "market");
                Some(order)
            }
            SignalAction::Close => {
                let order = self.gateway.close(symbol, None).await.map_err(gw)?;
                if order.is_some() {
                    Metrics::order_sent(symbol, "close");
                }
                order
            }
            SignalAction::Hold => None,
        };

        Ok(order.map(|order| {
            info!(
                symbol,
                action = %signal.action,
                cloid = %order.cloid,
                size = %order.size,
                "Order sent"
            );
            Trade {
                symbol: symbol.to_string(),
                action: signal.action,
                order,
                usd: signal.usd,
            }
        }))
    }

    /// Fail fast on credentials before the loop starts.
    pub async fn preflight(&self) -> StrategyResult<()> {
        match self.gateway.equity().await {
            Ok(equity) => {
                info!(strategy = %self.config.name, %equity, "Preflight complete");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(StrategyError::Preflight {
                name: self.config.name.clone(),
                source: e,
            }),
            Err(e) => {
                warn!(strategy = %self.config.name, error = %e, "Equity fetch failed in preflight");
                Ok(())
            }
        }
    }

    /// Call `run(false)` every `poll_interval` until `duration` elapses or
    /// `stop` fires.
    pub async fn run_loop(
        &mut self,
        poll_interval: Duration,
        duration: Option<Duration>,
        stop: &CancellationToken,
    ) -> StrategyResult<StrategyLoopSummary> {
        self.preflight().await?;

        let started = Instant::now();
        let mut summary = StrategyLoopSummary::new(&self.config.name, self.clock.now());
        info!(
            strategy = %self.config.name,
            version = %self.config.version,
            timeframe = %self.config.timeframe,
            assets = self.config.assets().len(),
            poll_ms = poll_interval.as_millis() as u64,
            ?duration,
            dry_run = self.config.flags.dry_run,
            "Strategy loop started"
        );

        loop {
            if stop.is_cancelled() {
                break;
            }

            let result = self.run(false).await;
            summary.record(&result);

            let wait = match duration {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        break;
                    }
                    poll_interval.min(remaining)
                }
                None => poll_interval,
            };

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if duration.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }
        }

        summary.finished_at = Some(self.clock.now());
        info!(
            strategy = %summary.name,
            ticks = summary.ticks,
            evaluated = summary.evaluated,
            trades = summary.trades,
            errors = summary.errors,
            "Strategy loop stopped"
        );
        Ok(summary)
    }
}

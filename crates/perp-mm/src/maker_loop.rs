//! Market maker run loop.
//!
//! One `run_once` is one requote cycle:
//! 1. Read equity and roll the daily PnL baseline
//! 2. Read the top of book and the position
//! 3. Evaluate the risk guard
//! 4. Quote (or cancel everything when halted)
//!
//! Failures are caught per cycle and reported in the result; `run_loop`
//! keeps going until its duration elapses or it is cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use perp_core::{Clock, CycleError, ErrorKind, InstrumentSpec, Order, OrderSide, SystemClock};
use perp_gateway::{DynGateway, GatewayError, LimitOrderRequest, QuoteRequest};
use perp_risk::{DailyPnlTracker, HaltCause, RiskGuard, RiskVerdict};
use perp_telemetry::Metrics;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MarketMakerConfig;
use crate::error::{MakerError, MakerResult};
use crate::inventory::InventoryState;
use crate::quote_engine::{apply_book_guard, compute_quote, Quote};

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MakerStatus {
    Quoted,
    DryRun,
    MaxInventory,
    StopLoss,
    DailyLossLimit,
    Error,
}

impl MakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quoted => "quoted",
            Self::DryRun => "dry_run",
            Self::MaxInventory => "max_inventory",
            Self::StopLoss => "stop_loss",
            Self::DailyLossLimit => "daily_loss_limit",
            Self::Error => "error",
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(
            self,
            Self::MaxInventory | Self::StopLoss | Self::DailyLossLimit
        )
    }
}

impl From<HaltCause> for MakerStatus {
    fn from(cause: HaltCause) -> Self {
        match cause {
            HaltCause::MaxInventory => Self::MaxInventory,
            HaltCause::StopLoss => Self::StopLoss,
            HaltCause::DailyLossLimit => Self::DailyLossLimit,
        }
    }
}

/// What the cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MakerAction {
    PlacedOrders,
    WouldQuote,
    CancelAll,
}

/// Result of one `run_once`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerCycleResult {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub status: MakerStatus,
    /// `None` when the cycle failed before acting.
    pub action: Option<MakerAction>,
    pub quote: Option<Quote>,
    pub inventory: Option<InventoryState>,
    pub verdict: Option<RiskVerdict>,
    /// Orders acknowledged by the gateway.
    pub orders: Vec<Order>,
    /// Resting orders cancelled.
    pub cancelled: usize,
    pub errors: Vec<CycleError>,
    /// Human-readable failure message when `status` is `error`.
    pub message: Option<String>,
}

impl MakerCycleResult {
    fn new(timestamp: DateTime<Utc>, symbol: &str) -> Self {
        Self {
            timestamp,
            symbol: symbol.to_string(),
            status: MakerStatus::Error,
            action: None,
            quote: None,
            inventory: None,
            verdict: None,
            orders: Vec::new(),
            cancelled: 0,
            errors: Vec::new(),
            message: None,
        }
    }

    fn fail(&mut self, error: CycleError) {
        self.status = MakerStatus::Error;
        self.action = None;
        self.message = Some(error.to_string());
        self.errors.push(error);
    }
}

/// Totals over a `run_loop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub name: String,
    pub cycles: u64,
    pub quoted: u64,
    pub dry_run: u64,
    pub halted: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl LoopSummary {
    fn new(name: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            cycles: 0,
            quoted: 0,
            dry_run: 0,
            halted: 0,
            errors: 0,
            started_at,
            finished_at: None,
        }
    }

    fn record(&mut self, result: &MakerCycleResult) {
        self.cycles += 1;
        match result.status {
            MakerStatus::Quoted => self.quoted += 1,
            MakerStatus::DryRun => self.dry_run += 1,
            MakerStatus::Error => self.errors += 1,
            _ => self.halted += 1,
        }
    }
}

fn gateway_error(symbol: &str, error: &GatewayError) -> CycleError {
    Metrics::gateway_error(error.kind().as_str());
    CycleError::new(Some(symbol), error.kind(), error.to_string())
}

/// Two-sided quoting loop for one symbol.
pub struct MarketMakerLoop {
    config: MarketMakerConfig,
    gateway: DynGateway,
    guard: RiskGuard,
    daily: DailyPnlTracker,
    clock: Arc<dyn Clock>,
    /// Cached after preflight or the first cycle.
    instrument: Option<InstrumentSpec>,
}

impl MarketMakerLoop {
    pub fn new(config: MarketMakerConfig, gateway: DynGateway) -> Self {
        let guard = RiskGuard::new(config.risk_limits());
        Self {
            config,
            gateway,
            guard,
            daily: DailyPnlTracker::new(),
            clock: Arc::new(SystemClock),
            instrument: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MarketMakerConfig {
        &self.config
    }

    /// Fetch the instrument spec and starting equity.
    ///
    /// Authentication failures and unknown symbols abort; other errors are
    /// logged and left to the first cycle.
    pub async fn preflight(&mut self) -> MakerResult<()> {
        let symbol = self.config.symbol.clone();
        let abort = |source: GatewayError| MakerError::Preflight {
            symbol: symbol.clone(),
            source,
        };

        match self.gateway.instrument(&symbol).await {
            Ok(spec) => {
                info!(
                    symbol = %symbol,
                    tick_size = %spec.tick_size,
                    lot_size = %spec.lot_size,
                    min_notional = %spec.min_notional,
                    "Instrument loaded"
                );
                self.instrument = Some(spec);
            }
            Err(e) if e.is_fatal() || matches!(e, GatewayError::NotFound(_)) => {
                return Err(abort(e));
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "Instrument fetch failed in preflight"),
        }

        match self.gateway.equity().await {
            Ok(equity) => {
                self.daily.observe(self.clock.now(), equity);
                info!(symbol = %symbol, %equity, "Preflight complete");
            }
            Err(e) if e.is_fatal() => return Err(abort(e)),
            Err(e) => warn!(symbol = %symbol, error = %e, "Equity fetch failed in preflight"),
        }
        Ok(())
    }

    /// Run one requote cycle.
    pub async fn run_once(&mut self) -> MakerCycleResult {
        let started = Instant::now();
        let mut result = MakerCycleResult::new(self.clock.now(), &self.config.symbol);

        if let Err(error) = self.cycle(&mut result).await {
            warn!(symbol = %result.symbol, %error, "Market maker cycle failed");
            result.fail(error);
        }

        Metrics::mm_cycle(&result.symbol, result.status.as_str());
        Metrics::cycle_duration("market_maker", started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn instrument(&mut self, symbol: &str) -> Result<InstrumentSpec, CycleError> {
        if let Some(spec) = &self.instrument {
            return Ok(spec.clone());
        }
        let spec = self
            .gateway
            .instrument(symbol)
            .await
            .map_err(|e| gateway_error(symbol, &e))?;
        self.instrument = Some(spec.clone());
        Ok(spec)
    }

    async fn cycle(&mut self, result: &mut MakerCycleResult) -> Result<(), CycleError> {
        let symbol = self.config.symbol.clone();
        let dry_run = self.config.flags.dry_run;

        let equity = self
            .gateway
            .equity()
            .await
            .map_err(|e| gateway_error(&symbol, &e))?;
        let daily_pnl = self.daily.observe(result.timestamp, equity);

        let book = self
            .gateway
            .spread(&symbol)
            .await
            .map_err(|e| gateway_error(&symbol, &e))?;
        if !book.bid.is_positive() || book.ask <= book.bid {
            return Err(CycleError::new(
                Some(&symbol),
                ErrorKind::Data,
                format!("unusable book {} / {}", book.bid, book.ask),
            ));
        }

        let position = self
            .gateway
            .position(&symbol)
            .await
            .map_err(|e| gateway_error(&symbol, &e))?;
        let spec = self.instrument(&symbol).await?;

        let inventory =
            InventoryState::from_position(&symbol, position.as_ref(), book.mid, daily_pnl);
        Metrics::inventory(&symbol, inventory.inventory_usd.to_f64().unwrap_or(0.0));

        let verdict = self.guard.evaluate(&symbol, &inventory.exposure());
        result.inventory = Some(inventory.clone());
        result.verdict = Some(verdict);

        if let RiskVerdict::Halted(cause) = verdict {
            result.status = cause.into();
            result.action = Some(MakerAction::CancelAll);
            Metrics::risk_halt(&symbol, cause.as_str());
            if !dry_run {
                match self.gateway.cancel_all(Some(&symbol)).await {
                    Ok(cancelled) => {
                        result.cancelled = cancelled;
                        Metrics::order_sent(&symbol, "cancel");
                    }
                    Err(e) => result.errors.push(gateway_error(&symbol, &e)),
                }
            }
            return Ok(());
        }

        let mut quote = compute_quote(book.mid, &self.config, &inventory, &spec);
        if self.config.execution.post_only {
            apply_book_guard(
                &mut quote,
                &book,
                self.config.execution.min_edge_bps,
                spec.tick_size,
            );
        }
        if !quote.bid_price.is_positive() {
            return Err(CycleError::new(
                Some(&symbol),
                ErrorKind::InvalidRequest,
                format!(
                    "skewed bid {} is not positive (skew {} bps)",
                    quote.bid_price,
                    quote.skew_bps.round_dp(2)
                ),
            ));
        }
        let notional = quote.size.notional(book.mid);
        if !quote.size.is_positive() || notional < spec.min_notional {
            return Err(CycleError::new(
                Some(&symbol),
                ErrorKind::InvalidRequest,
                format!(
                    "order size {} ({notional:.2} USD) below minimum notional {}",
                    quote.size, spec.min_notional
                ),
            ));
        }
        Metrics::quoted_spread(&symbol, quote.spread_bps.to_f64().unwrap_or(0.0));

        if self.config.flags.log_quotes {
            info!(
                symbol = %symbol,
                mid = %book.mid,
                bid = %quote.bid_price,
                ask = %quote.ask_price,
                size = %quote.size,
                spread_bps = %quote.spread_bps.round_dp(2),
                skew_bps = %quote.skew_bps.round_dp(2),
                inventory_usd = %inventory.inventory_usd.round_dp(2),
                suppressed = ?quote.suppressed,
                dry_run,
                "Quote computed"
            );
        }
        result.quote = Some(quote.clone());

        if dry_run {
            result.status = MakerStatus::DryRun;
            result.action = Some(MakerAction::WouldQuote);
            return Ok(());
        }

        self.place(&symbol, &quote, result).await
    }

    /// Send the top-level quote, then ladder levels.
    async fn place(
        &self,
        symbol: &str,
        quote: &Quote,
        result: &mut MakerCycleResult,
    ) -> Result<(), CycleError> {
        let post_only = self.config.execution.post_only;

        match quote.suppressed {
            None => {
                let ack = self
                    .gateway
                    .quote(QuoteRequest {
                        symbol: symbol.to_string(),
                        bid: quote.bid_price,
                        ask: quote.ask_price,
                        size: quote.size,
                        cancel_existing: true,
                        post_only,
                    })
                    .await
                    .map_err(|e| gateway_error(symbol, &e))?;
                result.cancelled += ack.cancelled;
                result.orders.push(ack.bid_order);
                result.orders.push(ack.ask_order);
                Metrics::order_sent(symbol, "quote");
            }
            Some(suppressed) => {
                result.cancelled += self
                    .gateway
                    .cancel_all(Some(symbol))
                    .await
                    .map_err(|e| gateway_error(symbol, &e))?;
                let side = suppressed.opposite();
                let price = match side {
                    OrderSide::Buy => quote.bid_price,
                    OrderSide::Sell => quote.ask_price,
                };
                debug!(symbol, %suppressed, "Quoting one side only");
                let order = self
                    .gateway
                    .limit_order(LimitOrderRequest {
                        symbol: symbol.to_string(),
                        side,
                        price,
                        size: quote.size,
                        post_only,
                    })
                    .await
                    .map_err(|e| gateway_error(symbol, &e))?;
                result.orders.push(order);
                Metrics::order_sent(symbol, "limit");
            }
        }

        for level in &quote.levels {
            for (side, price) in [(OrderSide::Buy, level.bid), (OrderSide::Sell, level.ask)] {
                if !quote.quotes_side(side) {
                    continue;
                }
                let request = LimitOrderRequest {
                    symbol: symbol.to_string(),
                    side,
                    price,
                    size: quote.size,
                    post_only,
                };
                match self.gateway.limit_order(request).await {
                    Ok(order) => {
                        result.orders.push(order);
                        Metrics::order_sent(symbol, "limit");
                    }
                    Err(e) => result.errors.push(gateway_error(symbol, &e)),
                }
            }
        }

        result.status = MakerStatus::Quoted;
        result.action = Some(MakerAction::PlacedOrders);
        Ok(())
    }

    /// Preflight, then requote every `requote_interval_sec` until `duration`
    /// elapses or `stop` fires. Resting orders for the symbol are cancelled
    /// on exit unless in dry-run.
    pub async fn run_loop(
        &mut self,
        duration: Option<Duration>,
        stop: &CancellationToken,
    ) -> MakerResult<LoopSummary> {
        self.preflight().await?;

        let interval = self.config.requote_interval();
        let started = Instant::now();
        let mut summary = LoopSummary::new(&self.config.name, self.clock.now());
        info!(
            name = %self.config.name,
            symbol = %self.config.symbol,
            interval_ms = interval.as_millis() as u64,
            ?duration,
            dry_run = self.config.flags.dry_run,
            "Market maker loop started"
        );

        loop {
            if stop.is_cancelled() {
                break;
            }

            let result = self.run_once().await;
            summary.record(&result);

            let wait = match duration {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        break;
                    }
                    interval.min(remaining)
                }
                None => interval,
            };

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if duration.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }
        }

        if !self.config.flags.dry_run {
            match self.gateway.cancel_all(Some(&self.config.symbol)).await {
                Ok(cancelled) => info!(symbol = %self.config.symbol, cancelled, "Quotes withdrawn"),
                Err(e) => warn!(symbol = %self.config.symbol, error = %e, "Failed to withdraw quotes"),
            }
        }

        summary.finished_at = Some(self.clock.now());
        info!(
            name = %summary.name,
            cycles = summary.cycles,
            quoted = summary.quoted,
            halted = summary.halted,
            errors = summary.errors,
            "Market maker loop stopped"
        );
        Ok(summary)
    }
}

//! In-memory gateway for tests.
//!
//! Holds scripted market data and a simple account, fills market orders at
//! the mid, records every call and can inject errors per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use perp_core::{
    Candle, InstrumentSpec, Order, OrderSide, Position, Price, Size, SpreadSnapshot, Timeframe,
};
use rust_decimal::Decimal;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{
    BoxFuture, LimitOrderRequest, MarketOrderRequest, OrderAmount, OrderGateway, QuoteAck,
    QuoteRequest,
};

/// Gateway operation, used for call recording and error injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Price,
    Spread,
    Instrument,
    Candles,
    Position,
    Positions,
    OpenOrders,
    Equity,
    Quote,
    LimitOrder,
    MarketOrder,
    Close,
    CancelAll,
    SetLeverage,
}

impl MockOp {
    /// Operations that change account state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Quote
                | Self::LimitOrder
                | Self::MarketOrder
                | Self::Close
                | Self::CancelAll
                | Self::SetLeverage
        )
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    pub symbol: Option<String>,
}

#[derive(Debug)]
struct MockState {
    spreads: HashMap<String, SpreadSnapshot>,
    instruments: HashMap<String, InstrumentSpec>,
    candles: HashMap<String, Vec<Candle>>,
    positions: HashMap<String, Position>,
    resting: Vec<Order>,
    leverage: HashMap<String, u32>,
    equity: Decimal,
}

/// Mock order gateway for testing.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
    failures: Mutex<HashMap<(MockOp, Option<String>), GatewayError>>,
    calls: Mutex<Vec<MockCall>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when a mutation finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGateway {
    /// Empty market, no positions, $10,000 equity.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                spreads: HashMap::new(),
                instruments: HashMap::new(),
                candles: HashMap::new(),
                positions: HashMap::new(),
                resting: Vec::new(),
                leverage: HashMap::new(),
                equity: Decimal::from(10_000),
            }),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Set a book one basis point either side of `mid`.
    pub fn set_mid(&self, symbol: &str, mid: Decimal) {
        let half = mid / Decimal::from(10_000);
        self.set_book(symbol, mid - half, mid + half);
    }

    /// Set the top of book. Crossed books are stored as given.
    pub fn set_book(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        let mid = (bid + ask) / Decimal::TWO;
        let spread_bps = if mid.is_zero() {
            Decimal::ZERO
        } else {
            (ask - bid) / mid * Decimal::from(10_000)
        };
        let snapshot = SpreadSnapshot {
            bid: Price::new(bid),
            ask: Price::new(ask),
            mid: Price::new(mid),
            spread_bps,
            received_at: Utc::now(),
        };
        self.state.lock().spreads.insert(symbol.to_string(), snapshot);
    }

    pub fn set_instrument(&self, spec: InstrumentSpec) {
        self.state.lock().instruments.insert(spec.symbol.clone(), spec);
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.state.lock().candles.insert(symbol.to_string(), candles);
    }

    /// Set a close-only candle series, one minute apart.
    pub fn set_closes(&self, symbol: &str, closes: &[Decimal]) {
        let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                Candle::flat(
                    start + chrono::Duration::minutes(i as i64),
                    Price::new(*close),
                )
            })
            .collect();
        self.set_candles(symbol, candles);
    }

    pub fn set_position(&self, position: Position) {
        self.state
            .lock()
            .positions
            .insert(position.symbol.clone(), position);
    }

    pub fn clear_position(&self, symbol: &str) {
        self.state.lock().positions.remove(symbol);
    }

    pub fn set_equity(&self, equity: Decimal) {
        self.state.lock().equity = equity;
    }

    /// Delay applied inside every mutation.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Fail every call of `op` until cleared.
    pub fn fail(&self, op: MockOp, error: GatewayError) {
        self.failures.lock().insert((op, None), error);
    }

    /// Fail calls of `op` for one symbol until cleared.
    pub fn fail_for(&self, op: MockOp, symbol: &str, error: GatewayError) {
        self.failures
            .lock()
            .insert((op, Some(symbol.to_string())), error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.op.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn resting_orders(&self) -> Vec<Order> {
        self.state.lock().resting.clone()
    }

    pub fn leverage(&self, symbol: &str) -> Option<u32> {
        self.state.lock().leverage.get(symbol).copied()
    }

    pub fn current_position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().positions.get(symbol).cloned()
    }

    /// Highest number of mutations observed running at once.
    pub fn max_concurrent_mutations(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, op: MockOp, symbol: Option<&str>) -> GatewayResult<()> {
        self.calls.lock().push(MockCall {
            op,
            symbol: symbol.map(str::to_string),
        });
        let failures = self.failures.lock();
        let scoped = symbol.and_then(|s| failures.get(&(op, Some(s.to_string()))));
        match scoped.or_else(|| failures.get(&(op, None))) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn begin_mutation(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }

    fn mid(state: &MockState, symbol: &str) -> GatewayResult<Price> {
        state
            .spreads
            .get(symbol)
            .map(|s| s.mid)
            .ok_or_else(|| GatewayError::NotFound(format!("no market data for {symbol}")))
    }

    fn spec(state: &MockState, symbol: &str) -> InstrumentSpec {
        state.instruments.get(symbol).cloned().unwrap_or_else(|| {
            InstrumentSpec::new(symbol, Price::new(Decimal::new(1, 2)), Size::new(Decimal::new(1, 4)))
        })
    }

    /// Fill at the mid and update the position and equity.
    fn fill(
        state: &mut MockState,
        symbol: &str,
        side: OrderSide,
        size: Size,
        reduce_only: bool,
    ) -> GatewayResult<Order> {
        let px = Self::mid(state, symbol)?;
        let leverage = state.leverage.get(symbol).copied().unwrap_or(1);
        let position = state
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| {
                let mut p = Position::new(symbol, Decimal::ZERO, Price::ZERO);
                p.leverage = leverage;
                p
            });
        let realized = position.apply_fill(side, px, size);
        if position.is_flat() {
            state.positions.remove(symbol);
        }
        state.equity += realized;
        Ok(Order::filled(symbol, side, size, px, reduce_only))
    }
}

impl OrderGateway for MockGateway {
    fn price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Price>> {
        Box::pin(async move {
            self.enter(MockOp::Price, Some(symbol))?;
            Self::mid(&self.state.lock(), symbol)
        })
    }

    fn spread<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>> {
        Box::pin(async move {
            self.enter(MockOp::Spread, Some(symbol))?;
            self.state
                .lock()
                .spreads
                .get(symbol)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(format!("no market data for {symbol}")))
        })
    }

    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>> {
        Box::pin(async move {
            self.enter(MockOp::Instrument, Some(symbol))?;
            Ok(Self::spec(&self.state.lock(), symbol))
        })
    }

    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>> {
        Box::pin(async move {
            self.enter(MockOp::Candles, Some(symbol))?;
            let state = self.state.lock();
            let candles = state.candles.get(symbol).cloned().unwrap_or_default();
            let skip = candles.len().saturating_sub(limit);
            Ok(candles.into_iter().skip(skip).collect())
        })
    }

    fn position<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Option<Position>>> {
        Box::pin(async move {
            self.enter(MockOp::Position, Some(symbol))?;
            Ok(self
                .state
                .lock()
                .positions
                .get(symbol)
                .filter(|p| !p.is_flat())
                .cloned())
        })
    }

    fn positions(&self) -> BoxFuture<'_, GatewayResult<Vec<Position>>> {
        Box::pin(async move {
            self.enter(MockOp::Positions, None)?;
            let mut positions: Vec<Position> = self
                .state
                .lock()
                .positions
                .values()
                .filter(|p| !p.is_flat())
                .cloned()
                .collect();
            positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            Ok(positions)
        })
    }

    fn open_orders<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, GatewayResult<Vec<Order>>> {
        Box::pin(async move {
            self.enter(MockOp::OpenOrders, symbol)?;
            Ok(self
                .state
                .lock()
                .resting
                .iter()
                .filter(|o| symbol.map_or(true, |s| o.symbol == s))
                .cloned()
                .collect())
        })
    }

    fn equity(&self) -> BoxFuture<'_, GatewayResult<Decimal>> {
        Box::pin(async move {
            self.enter(MockOp::Equity, None)?;
            Ok(self.state.lock().equity)
        })
    }

    fn quote(&self, request: QuoteRequest) -> BoxFuture<'_, GatewayResult<QuoteAck>> {
        Box::pin(async move {
            self.enter(MockOp::Quote, Some(&request.symbol))?;
            let _guard = self.begin_mutation().await;

            let mut state = self.state.lock();
            let cancelled = if request.cancel_existing {
                let before = state.resting.len();
                state.resting.retain(|o| o.symbol != request.symbol);
                before - state.resting.len()
            } else {
                0
            };
            let bid_order = Order::resting(
                &request.symbol,
                OrderSide::Buy,
                request.bid,
                request.size,
                request.post_only,
            );
            let ask_order = Order::resting(
                &request.symbol,
                OrderSide::Sell,
                request.ask,
                request.size,
                request.post_only,
            );
            state.resting.push(bid_order.clone());
            state.resting.push(ask_order.clone());
            Ok(QuoteAck {
                bid_order,
                ask_order,
                cancelled,
            })
        })
    }

    fn limit_order(&self, request: LimitOrderRequest) -> BoxFuture<'_, GatewayResult<Order>> {
        Box::pin(async move {
            self.enter(MockOp::LimitOrder, Some(&request.symbol))?;
            let _guard = self.begin_mutation().await;

            let order = Order::resting(
                &request.symbol,
                request.side,
                request.price,
                request.size,
                request.post_only,
            );
            self.state.lock().resting.push(order.clone());
            Ok(order)
        })
    }

    fn market_order(&self, request: MarketOrderRequest) -> BoxFuture<'_, GatewayResult<Order>> {
        Box::pin(async move {
            self.enter(MockOp::MarketOrder, Some(&request.symbol))?;
            let _guard = self.begin_mutation().await;

            let mut state = self.state.lock();
            let spec = Self::spec(&state, &request.symbol);
            let size = match request.amount {
                OrderAmount::Size(size) => size,
                OrderAmount::Usd(usd) => {
                    Size::from_usd(usd, Self::mid(&state, &request.symbol)?)
                }
            }
            .round_to_lot(spec.lot_size);
            if !size.is_positive() {
                return Err(GatewayError::InvalidRequest(format!(
                    "order size for {} rounds to zero",
                    request.symbol
                )));
            }
            Self::fill(
                &mut state,
                &request.symbol,
                request.side,
                size,
                request.reduce_only,
            )
        })
    }

    fn close<'a>(
        &'a self,
        symbol: &'a str,
        size: Option<Size>,
    ) -> BoxFuture<'a, GatewayResult<Option<Order>>> {
        Box::pin(async move {
            self.enter(MockOp::Close, Some(symbol))?;
            let _guard = self.begin_mutation().await;

            let mut state = self.state.lock();
            let Some(position) = state.positions.get(symbol).filter(|p| !p.is_flat()) else {
                return Ok(None);
            };
            let Some(side) = position.side().map(|s| s.opposite()) else {
                return Ok(None);
            };
            let open = Size::new(position.size.abs());
            let size = size.map_or(open, |s| s.min(open));
            Self::fill(&mut state, symbol, side, size, true).map(Some)
        })
    }

    fn cancel_all<'a>(&'a self, symbol: Option<&'a str>) -> BoxFuture<'a, GatewayResult<usize>> {
        Box::pin(async move {
            self.enter(MockOp::CancelAll, symbol)?;
            let _guard = self.begin_mutation().await;

            let mut state = self.state.lock();
            let before = state.resting.len();
            state
                .resting
                .retain(|o| symbol.is_some_and(|s| o.symbol != s));
            Ok(before - state.resting.len())
        })
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a str,
        leverage: u32,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            self.enter(MockOp::SetLeverage, Some(symbol))?;
            let _guard = self.begin_mutation().await;

            let mut state = self.state.lock();
            state.leverage.insert(symbol.to_string(), leverage);
            if let Some(position) = state.positions.get_mut(symbol) {
                position.leverage = leverage;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_market_order_by_usd_opens_position() {
        let gw = MockGateway::new();
        gw.set_mid("BTC", dec!(50000));

        let order = gw
            .buy("BTC", OrderAmount::Usd(dec!(1000)), None)
            .await
            .unwrap();

        assert_eq!(order.size.inner(), dec!(0.02));
        let position = gw.position("BTC").await.unwrap().unwrap();
        assert_eq!(position.size, dec!(0.02));
        assert_eq!(position.entry_price.inner(), dec!(50000));
    }

    #[tokio::test]
    async fn test_close_realizes_pnl_into_equity() {
        let gw = MockGateway::new();
        gw.set_mid("ETH", dec!(2000));
        gw.buy("ETH", OrderAmount::Size(Size::new(dec!(1))), None)
            .await
            .unwrap();

        gw.set_mid("ETH", dec!(2100));
        let closed = gw.close("ETH", None).await.unwrap().unwrap();

        assert_eq!(closed.side, OrderSide::Sell);
        assert!(closed.reduce_only);
        assert!(gw.position("ETH").await.unwrap().is_none());
        assert_eq!(gw.equity().await.unwrap(), dec!(10100));
    }

    #[tokio::test]
    async fn test_close_without_position_is_none() {
        let gw = MockGateway::new();
        gw.set_mid("ETH", dec!(2000));
        assert!(gw.close("ETH", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quote_replaces_resting_orders() {
        let gw = MockGateway::new();
        let request = QuoteRequest {
            symbol: "SOL".to_string(),
            bid: Price::new(dec!(99)),
            ask: Price::new(dec!(101)),
            size: Size::new(dec!(1)),
            cancel_existing: true,
            post_only: true,
        };

        gw.quote(request.clone()).await.unwrap();
        let ack = gw.quote(request).await.unwrap();

        assert_eq!(ack.cancelled, 2);
        assert_eq!(gw.resting_orders().len(), 2);
        assert!(ack.bid_order.is_post_only());
    }

    #[tokio::test]
    async fn test_injected_failure_scoped_to_symbol() {
        let gw = MockGateway::new();
        gw.set_mid("BTC", dec!(100));
        gw.set_mid("ETH", dec!(100));
        gw.fail_for(
            MockOp::Price,
            "BTC",
            GatewayError::TransientNetwork("timeout".into()),
        );

        assert!(gw.price("BTC").await.unwrap_err().is_transient());
        assert!(gw.price("ETH").await.is_ok());
        assert_eq!(gw.call_count(MockOp::Price), 2);
        assert_eq!(gw.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_counts_removed() {
        let gw = MockGateway::new();
        gw.limit_buy("BTC", Price::new(dec!(1)), Size::new(dec!(1)), false)
            .await
            .unwrap();
        gw.limit_sell("ETH", Price::new(dec!(2)), Size::new(dec!(1)), false)
            .await
            .unwrap();

        assert_eq!(gw.cancel_all(Some("BTC")).await.unwrap(), 1);
        assert_eq!(gw.cancel_all(None).await.unwrap(), 1);
        assert!(gw.resting_orders().is_empty());
    }
}

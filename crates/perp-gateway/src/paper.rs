//! Paper trading gateway.
//!
//! Reads real public market data and simulates the account locally:
//! market orders take the top of book, resting limit orders fill when a
//! later book read trades through them.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use perp_core::{
    Candle, InstrumentSpec, Order, OrderSide, Position, Price, Size, SpreadSnapshot,
    Timeframe,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{
    BoxFuture, LimitOrderRequest, MarketOrderRequest, OrderAmount, OrderGateway, QuoteAck,
    QuoteRequest,
};
use crate::info_client::MarketDataSource;

/// Simulated account state. Serializable so it survives between CLI runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperAccount {
    /// Cash balance in USD, including realized PnL.
    pub cash: Decimal,
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
    #[serde(default)]
    pub resting: Vec<Order>,
    #[serde(default)]
    pub leverage: BTreeMap<String, u32>,
}

impl PaperAccount {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            resting: Vec::new(),
            leverage: BTreeMap::new(),
        }
    }

    fn leverage_for(&self, symbol: &str) -> u32 {
        self.leverage.get(symbol).copied().unwrap_or(1).max(1)
    }

    /// Margin in use, with positions valued at entry.
    fn used_margin(&self, except: &str) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.symbol != except)
            .map(|p| p.size.abs() * p.entry_price.inner() / Decimal::from(p.leverage.max(1)))
            .sum()
    }

    /// Apply a fill and book realized PnL into cash.
    fn apply_fill(&mut self, symbol: &str, side: OrderSide, price: Price, size: Size) {
        let leverage = self.leverage_for(symbol);
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| {
                let mut p = Position::new(symbol, Decimal::ZERO, Price::ZERO);
                p.leverage = leverage;
                p
            });
        let realized = position.apply_fill(side, price, size);
        if position.is_flat() {
            self.positions.remove(symbol);
        }
        self.cash += realized;
    }

    /// Reject a fill whose resulting margin exceeds cash.
    fn check_margin(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Price,
        size: Size,
    ) -> GatewayResult<()> {
        let current = self.positions.get(symbol).map_or(Decimal::ZERO, |p| p.size);
        let signed = match side {
            OrderSide::Buy => size.inner(),
            OrderSide::Sell => -size.inner(),
        };
        let after = current + signed;
        if after.abs() <= current.abs() {
            return Ok(());
        }

        let leverage = Decimal::from(self.leverage_for(symbol));
        let required = after.abs() * price.inner() / leverage + self.used_margin(symbol);
        if required > self.cash {
            return Err(GatewayError::InsufficientFunds(format!(
                "{symbol}: margin {required:.2} exceeds balance {:.2}",
                self.cash
            )));
        }
        Ok(())
    }

    /// Fill resting orders the book has traded through. Returns how many filled.
    fn sweep(&mut self, symbol: &str, book: &SpreadSnapshot) -> usize {
        let (crossed, keep): (Vec<Order>, Vec<Order>) =
            std::mem::take(&mut self.resting).into_iter().partition(|o| {
                o.symbol == symbol
                    && o.price.is_some_and(|px| match o.side {
                        OrderSide::Buy => px >= book.ask,
                        OrderSide::Sell => px <= book.bid,
                    })
            });
        self.resting = keep;

        for order in &crossed {
            if let Some(px) = order.price {
                debug!(symbol, side = %order.side, price = %px, size = %order.size, "Paper resting order filled");
                self.apply_fill(symbol, order.side, px, order.size);
            }
        }
        crossed.len()
    }

    fn cancel(&mut self, symbol: Option<&str>) -> usize {
        let before = self.resting.len();
        self.resting.retain(|o| symbol.is_some_and(|s| o.symbol != s));
        before - self.resting.len()
    }
}

/// Gateway over live public data with a simulated account.
pub struct PaperGateway<M> {
    market: M,
    account: Mutex<PaperAccount>,
}

impl<M: MarketDataSource> PaperGateway<M> {
    pub fn new(market: M, account: PaperAccount) -> Self {
        Self {
            market,
            account: Mutex::new(account),
        }
    }

    /// Copy of the account for persistence.
    pub fn snapshot(&self) -> PaperAccount {
        self.account.lock().clone()
    }

    async fn book(&self, symbol: &str) -> GatewayResult<SpreadSnapshot> {
        let book = self.market.book(symbol).await?;
        self.account.lock().sweep(symbol, &book);
        Ok(book)
    }

    fn reject_crossing(request: &LimitOrderRequest, book: &SpreadSnapshot) -> GatewayResult<()> {
        let crosses = match request.side {
            OrderSide::Buy => request.price >= book.ask,
            OrderSide::Sell => request.price <= book.bid,
        };
        if request.post_only && crosses {
            return Err(GatewayError::Order(format!(
                "{}: post-only {} at {} would cross the book",
                request.symbol, request.side, request.price
            )));
        }
        Ok(())
    }

    /// Place a limit order against a fresh book. Crossing non-post-only
    /// orders fill immediately at the opposite top of book.
    fn place_limit(
        account: &mut PaperAccount,
        request: &LimitOrderRequest,
        book: &SpreadSnapshot,
    ) -> GatewayResult<Order> {
        Self::reject_crossing(request, book)?;
        let taker_px = match request.side {
            OrderSide::Buy if request.price >= book.ask => Some(book.ask),
            OrderSide::Sell if request.price <= book.bid => Some(book.bid),
            _ => None,
        };
        match taker_px {
            Some(px) => {
                account.check_margin(&request.symbol, request.side, px, request.size)?;
                account.apply_fill(&request.symbol, request.side, px, request.size);
                let mut order = Order::filled(&request.symbol, request.side, request.size, px, false);
                order.price = Some(request.price);
                Ok(order)
            }
            None => {
                account.check_margin(&request.symbol, request.side, request.price, request.size)?;
                let order = Order::resting(
                    &request.symbol,
                    request.side,
                    request.price,
                    request.size,
                    request.post_only,
                );
                account.resting.push(order.clone());
                Ok(order)
            }
        }
    }
}

impl<M: MarketDataSource> OrderGateway for PaperGateway<M> {
    fn price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Price>> {
        Box::pin(async move { Ok(self.book(symbol).await?.mid) })
    }

    fn spread<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>> {
        Box::pin(async move { self.book(symbol).await })
    }

    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>> {
        self.market.instrument(symbol)
    }

    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>> {
        self.market.candles(symbol, timeframe, limit)
    }

    fn position<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Option<Position>>> {
        Box::pin(async move { Ok(self.account.lock().positions.get(symbol).cloned()) })
    }

    fn positions(&self) -> BoxFuture<'_, GatewayResult<Vec<Position>>> {
        Box::pin(async move { Ok(self.account.lock().positions.values().cloned().collect()) })
    }

    fn open_orders<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, GatewayResult<Vec<Order>>> {
        Box::pin(async move {
            Ok(self
                .account
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
            let has_positions = !self.account.lock().positions.is_empty();
            let mids = if has_positions {
                self.market.all_mids().await?
            } else {
                Default::default()
            };
            let account = self.account.lock();
            let unrealized: Decimal = account
                .positions
                .values()
                .filter_map(|p| mids.get(&p.symbol).map(|mid| p.unrealized_pnl(*mid)))
                .sum();
            Ok(account.cash + unrealized)
        })
    }

    fn quote(&self, request: QuoteRequest) -> BoxFuture<'_, GatewayResult<QuoteAck>> {
        Box::pin(async move {
            let book = self.book(&request.symbol).await?;
            let bid = LimitOrderRequest {
                symbol: request.symbol.clone(),
                side: OrderSide::Buy,
                price: request.bid,
                size: request.size,
                post_only: request.post_only,
            };
            let ask = LimitOrderRequest {
                side: OrderSide::Sell,
                price: request.ask,
                ..bid.clone()
            };
            Self::reject_crossing(&bid, &book)?;
            Self::reject_crossing(&ask, &book)?;

            let mut account = self.account.lock();
            let cancelled = if request.cancel_existing {
                account.cancel(Some(&request.symbol))
            } else {
                0
            };
            let bid_order = Self::place_limit(&mut account, &bid, &book)?;
            let ask_order = Self::place_limit(&mut account, &ask, &book)?;
            info!(
                symbol = %request.symbol,
                bid = %request.bid,
                ask = %request.ask,
                size = %request.size,
                cancelled,
                "Paper quote placed"
            );
            Ok(QuoteAck {
                bid_order,
                ask_order,
                cancelled,
            })
        })
    }

    fn limit_order(&self, request: LimitOrderRequest) -> BoxFuture<'_, GatewayResult<Order>> {
        Box::pin(async move {
            let book = self.book(&request.symbol).await?;
            let mut account = self.account.lock();
            Self::place_limit(&mut account, &request, &book)
        })
    }

    fn market_order(&self, request: MarketOrderRequest) -> BoxFuture<'_, GatewayResult<Order>> {
        Box::pin(async move {
            let spec = self.market.instrument(&request.symbol).await?;
            let book = self.book(&request.symbol).await?;
            let px = match request.side {
                OrderSide::Buy => book.ask,
                OrderSide::Sell => book.bid,
            };
            if let Some(limit) = request.limit_price {
                let beyond = match request.side {
                    OrderSide::Buy => px > limit,
                    OrderSide::Sell => px < limit,
                };
                if beyond {
                    return Err(GatewayError::Order(format!(
                        "{}: top of book {px} is beyond limit {limit}",
                        request.symbol
                    )));
                }
            }

            let mut size = match request.amount {
                OrderAmount::Size(size) => size,
                OrderAmount::Usd(usd) => Size::from_usd(usd, px),
            }
            .round_to_lot(spec.lot_size);

            let mut account = self.account.lock();
            if request.reduce_only {
                let open = account
                    .positions
                    .get(&request.symbol)
                    .filter(|p| p.side() == Some(request.side.opposite()))
                    .map(|p| Size::new(p.size.abs()));
                let Some(open) = open else {
                    return Err(GatewayError::Order(format!(
                        "{}: reduce-only {} would increase position",
                        request.symbol, request.side
                    )));
                };
                size = size.min(open);
            } else if size.notional(px) < spec.min_notional {
                return Err(GatewayError::InvalidRequest(format!(
                    "{}: order value {:.2} below minimum {}",
                    request.symbol,
                    size.notional(px),
                    spec.min_notional
                )));
            }
            if !size.is_positive() {
                return Err(GatewayError::InvalidRequest(format!(
                    "{}: order size rounds to zero",
                    request.symbol
                )));
            }

            account.check_margin(&request.symbol, request.side, px, size)?;
            account.apply_fill(&request.symbol, request.side, px, size);
            info!(
                symbol = %request.symbol,
                side = %request.side,
                price = %px,
                size = %size,
                reduce_only = request.reduce_only,
                "Paper market order filled"
            );
            Ok(Order::filled(
                &request.symbol,
                request.side,
                size,
                px,
                request.reduce_only,
            ))
        })
    }

    fn close<'a>(
        &'a self,
        symbol: &'a str,
        size: Option<Size>,
    ) -> BoxFuture<'a, GatewayResult<Option<Order>>> {
        Box::pin(async move {
            let position = self.account.lock().positions.get(symbol).cloned();
            let Some(side) = position.as_ref().and_then(Position::side) else {
                return Ok(None);
            };
            let open = Size::new(position.map_or(Decimal::ZERO, |p| p.size.abs()));
            let order = self
                .market_order(MarketOrderRequest {
                    symbol: symbol.to_string(),
                    side: side.opposite(),
                    amount: OrderAmount::Size(size.map_or(open, |s| s.min(open))),
                    limit_price: None,
                    reduce_only: true,
                })
                .await?;
            Ok(Some(order))
        })
    }

    fn cancel_all<'a>(&'a self, symbol: Option<&'a str>) -> BoxFuture<'a, GatewayResult<usize>> {
        Box::pin(async move {
            let cancelled = self.account.lock().cancel(symbol);
            debug!(?symbol, cancelled, "Paper orders cancelled");
            Ok(cancelled)
        })
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a str,
        leverage: u32,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let spec = self.market.instrument(symbol).await?;
            if leverage == 0 || leverage > spec.max_leverage {
                return Err(GatewayError::InvalidRequest(format!(
                    "{symbol}: leverage {leverage} outside 1..={}",
                    spec.max_leverage
                )));
            }
            let mut account = self.account.lock();
            account.leverage.insert(symbol.to_string(), leverage);
            if let Some(position) = account.positions.get_mut(symbol) {
                position.leverage = leverage;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// Scripted market data.
    struct StaticMarket {
        books: PlMutex<HashMap<String, (Decimal, Decimal)>>,
    }

    impl StaticMarket {
        fn new() -> Self {
            Self {
                books: PlMutex::new(HashMap::new()),
            }
        }

        fn set(&self, symbol: &str, bid: Decimal, ask: Decimal) {
            self.books.lock().insert(symbol.to_string(), (bid, ask));
        }
    }

    impl MarketDataSource for StaticMarket {
        fn book<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>> {
            Box::pin(async move {
                let (bid, ask) = self
                    .books
                    .lock()
                    .get(symbol)
                    .copied()
                    .ok_or_else(|| GatewayError::NotFound(symbol.to_string()))?;
                SpreadSnapshot::from_bbo(Price::new(bid), Price::new(ask))
                    .ok_or_else(|| GatewayError::InvalidRequest("crossed".into()))
            })
        }

        fn all_mids(&self) -> BoxFuture<'_, GatewayResult<HashMap<String, Price>>> {
            Box::pin(async move {
                Ok(self
                    .books
                    .lock()
                    .iter()
                    .map(|(s, (b, a))| (s.clone(), Price::new((*b + *a) / Decimal::TWO)))
                    .collect())
            })
        }

        fn instrument<'a>(
            &'a self,
            symbol: &'a str,
        ) -> BoxFuture<'a, GatewayResult<InstrumentSpec>> {
            Box::pin(async move {
                Ok(InstrumentSpec::new(
                    symbol,
                    Price::new(dec!(0.01)),
                    Size::new(dec!(0.001)),
                ))
            })
        }

        fn candles<'a>(
            &'a self,
            _symbol: &'a str,
            _timeframe: Timeframe,
            _limit: usize,
        ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    fn gateway(cash: Decimal) -> PaperGateway<StaticMarket> {
        let market = StaticMarket::new();
        market.set("ETH", dec!(1999), dec!(2001));
        PaperGateway::new(market, PaperAccount::new(cash))
    }

    #[tokio::test]
    async fn test_market_buy_fills_at_ask() {
        let gw = gateway(dec!(10000));
        let order = gw
            .buy("ETH", OrderAmount::Size(Size::new(dec!(1))), None)
            .await
            .unwrap();

        assert_eq!(order.fill_price.unwrap().inner(), dec!(2001));
        let position = gw.position("ETH").await.unwrap().unwrap();
        assert_eq!(position.size, dec!(1));
    }

    #[tokio::test]
    async fn test_margin_check_uses_leverage() {
        let gw = gateway(dec!(1000));
        let err = gw
            .buy("ETH", OrderAmount::Usd(dec!(5000)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InsufficientFunds(_)));

        gw.set_leverage("ETH", 10).await.unwrap();
        assert!(gw.buy("ETH", OrderAmount::Usd(dec!(5000)), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_post_only_crossing_rejected() {
        let gw = gateway(dec!(10000));
        let err = gw
            .limit_buy("ETH", Price::new(dec!(2001)), Size::new(dec!(1)), true)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Order(_)));
    }

    #[tokio::test]
    async fn test_resting_order_fills_when_book_trades_through() {
        let gw = gateway(dec!(10000));
        gw.limit_buy("ETH", Price::new(dec!(1990)), Size::new(dec!(1)), true)
            .await
            .unwrap();
        assert_eq!(gw.open_orders(Some("ETH")).await.unwrap().len(), 1);

        gw.market.set("ETH", dec!(1985), dec!(1989));
        gw.price("ETH").await.unwrap();

        assert!(gw.open_orders(None).await.unwrap().is_empty());
        let position = gw.position("ETH").await.unwrap().unwrap();
        assert_eq!(position.entry_price.inner(), dec!(1990));
    }

    #[tokio::test]
    async fn test_close_realizes_into_equity() {
        let gw = gateway(dec!(10000));
        gw.buy("ETH", OrderAmount::Size(Size::new(dec!(1))), None)
            .await
            .unwrap();
        gw.market.set("ETH", dec!(2101), dec!(2103));

        let closed = gw.close("ETH", None).await.unwrap().unwrap();
        assert_eq!(closed.fill_price.unwrap().inner(), dec!(2101));
        assert_eq!(gw.equity().await.unwrap(), dec!(10100));
        assert!(gw.close("ETH", None).await.unwrap().is_none());
    }

    #[test]
    fn test_account_serde_roundtrip_keeps_positions() {
        let mut account = PaperAccount::new(dec!(500));
        account.apply_fill("BTC", OrderSide::Sell, Price::new(dec!(60000)), Size::new(dec!(0.01)));
        let json = serde_json::to_string(&account).unwrap();
        let back: PaperAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }
}

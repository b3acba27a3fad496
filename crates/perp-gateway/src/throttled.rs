//! Rate-limited, per-symbol serialized gateway wrapper.
//!
//! Several loops may share one account. Mutations for the same symbol are
//! serialized; account-wide mutations (cancel of every symbol) exclude all
//! of them. Reads and mutations draw from separate rate budgets.

use std::sync::Arc;

use dashmap::DashMap;
use perp_core::{Candle, InstrumentSpec, Order, Position, Price, Size, SpreadSnapshot, Timeframe};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::GatewayResult;
use crate::gateway::{
    BoxFuture, LimitOrderRequest, MarketOrderRequest, OrderGateway, QuoteAck, QuoteRequest,
};
use crate::rate_limiter::RateLimiter;

fn default_max_mutations_per_sec() -> u32 {
    10
}

fn default_max_reads_per_sec() -> u32 {
    20
}

/// Rate budgets for a shared account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_max_mutations_per_sec")]
    pub max_mutations_per_sec: u32,
    #[serde(default = "default_max_reads_per_sec")]
    pub max_reads_per_sec: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_mutations_per_sec: default_max_mutations_per_sec(),
            max_reads_per_sec: default_max_reads_per_sec(),
        }
    }
}

/// Held for the duration of one symbol-scoped mutation.
struct SymbolPermit<'a> {
    _account: RwLockReadGuard<'a, ()>,
    _symbol: OwnedMutexGuard<()>,
}

pub struct ThrottledGateway {
    inner: Arc<dyn OrderGateway>,
    mutations: RateLimiter,
    reads: RateLimiter,
    account_lock: RwLock<()>,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ThrottledGateway {
    pub fn new(inner: Arc<dyn OrderGateway>, config: ThrottleConfig) -> Self {
        Self {
            inner,
            mutations: RateLimiter::per_second(config.max_mutations_per_sec),
            reads: RateLimiter::per_second(config.max_reads_per_sec),
            account_lock: RwLock::new(()),
            symbol_locks: DashMap::new(),
        }
    }

    async fn lock_symbol(&self, symbol: &str) -> SymbolPermit<'_> {
        let account = self.account_lock.read().await;
        let lock = self
            .symbol_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let symbol = lock.lock_owned().await;
        self.mutations.acquire().await;
        SymbolPermit {
            _account: account,
            _symbol: symbol,
        }
    }

    async fn lock_account(&self) -> RwLockWriteGuard<'_, ()> {
        let guard = self.account_lock.write().await;
        self.mutations.acquire().await;
        guard
    }
}

impl OrderGateway for ThrottledGateway {
    fn price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Price>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.price(symbol).await
        })
    }

    fn spread<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.spread(symbol).await
        })
    }

    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.instrument(symbol).await
        })
    }

    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.candles(symbol, timeframe, limit).await
        })
    }

    fn position<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<Option<Position>>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.position(symbol).await
        })
    }

    fn positions(&self) -> BoxFuture<'_, GatewayResult<Vec<Position>>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.positions().await
        })
    }

    fn open_orders<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, GatewayResult<Vec<Order>>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.open_orders(symbol).await
        })
    }

    fn equity(&self) -> BoxFuture<'_, GatewayResult<Decimal>> {
        Box::pin(async move {
            self.reads.acquire().await;
            self.inner.equity().await
        })
    }

    fn quote(&self, request: QuoteRequest) -> BoxFuture<'_, GatewayResult<QuoteAck>> {
        Box::pin(async move {
            let _permit = self.lock_symbol(&request.symbol).await;
            self.inner.quote(request).await
        })
    }

    fn limit_order(&self, request: LimitOrderRequest) -> BoxFuture<'_, GatewayResult<Order>> {
        Box::pin(async move {
            let _permit = self.lock_symbol(&request.symbol).await;
            self.inner.limit_order(request).await
        })
    }

    fn market_order(&self, request: MarketOrderRequest) -> BoxFuture<'_, GatewayResult<Order>> {
        Box::pin(async move {
            let _permit = self.lock_symbol(&request.symbol).await;
            self.inner.market_order(request).await
        })
    }

    fn close<'a>(
        &'a self,
        symbol: &'a str,
        size: Option<Size>,
    ) -> BoxFuture<'a, GatewayResult<Option<Order>>> {
        Box::pin(async move {
            let _permit = self.lock_symbol(symbol).await;
            self.inner.close(symbol, size).await
        })
    }

    fn cancel_all<'a>(&'a self, symbol: Option<&'a str>) -> BoxFuture<'a, GatewayResult<usize>> {
        Box::pin(async move {
            match symbol {
                Some(s) => {
                    let _permit = self.lock_symbol(s).await;
                    self.inner.cancel_all(Some(s)).await
                }
                None => {
                    let _guard = self.lock_account().await;
                    self.inner.cancel_all(None).await
                }
            }
        })
    }

    fn set_leverage<'a>(
        &'a self,
        symbol: &'a str,
        leverage: u32,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let _permit = self.lock_symbol(symbol).await;
            self.inner.set_leverage(symbol, leverage).await
        })
    }
}

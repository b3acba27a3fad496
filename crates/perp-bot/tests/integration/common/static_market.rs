//! Fixed market data for paper gateway tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use perp_core::{Candle, InstrumentSpec, Price, Size, SpreadSnapshot, Timeframe};
use perp_gateway::{BoxFuture, GatewayError, GatewayResult, MarketDataSource};
use rust_decimal::Decimal;

/// Books and candles set by the test. Clones share state, so the test can
/// move the book under a gateway that owns another handle.
#[derive(Clone, Default)]
pub struct StaticMarket {
    books: Arc<Mutex<HashMap<String, (Decimal, Decimal)>>>,
    closes: Arc<Mutex<HashMap<String, Vec<Decimal>>>>,
}

impl StaticMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_book(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.books.lock().insert(symbol.to_string(), (bid, ask));
    }

    pub fn set_closes(&self, symbol: &str, closes: Vec<Decimal>) {
        self.closes.lock().insert(symbol.to_string(), closes);
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
                .ok_or_else(|| GatewayError::InvalidRequest(format!("{symbol}: crossed book")))
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

    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>> {
        Box::pin(async move {
            if !self.books.lock().contains_key(symbol) {
                return Err(GatewayError::NotFound(format!("unknown symbol {symbol}")));
            }
            Ok(InstrumentSpec::new(
                symbol,
                Price::new(Decimal::new(1, 2)),
                Size::new(Decimal::new(1, 3)),
            ))
        })
    }

    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>> {
        Box::pin(async move {
            let closes = self.closes.lock().get(symbol).cloned().unwrap_or_default();
            let skip = closes.len().saturating_sub(limit);
            let start = Utc
                .timestamp_opt(1_700_000_000, 0)
                .single()
                .unwrap_or_else(Utc::now);
            Ok(closes
                .into_iter()
                .enumerate()
                .skip(skip)
                .map(|(i, close)| {
                    Candle::flat(start + chrono::Duration::hours(i as i64), Price::new(close))
                })
                .collect())
        })
    }
}

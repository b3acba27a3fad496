//! HTTP client for public market data.
//!
//! Reads order books, mids, instrument metadata and candles from the
//! exchange info endpoint. No credentials are involved.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use perp_core::{Candle, InstrumentSpec, Price, Size, SpreadSnapshot, Timeframe};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::BoxFuture;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum price decimals for perps; the per-asset limit is this minus `szDecimals`.
const MAX_PERP_PRICE_DECIMALS: u32 = 6;

pub const MAINNET_INFO_URL: &str = "https://api.hyperliquid.xyz/info";
pub const TESTNET_INFO_URL: &str = "https://api.hyperliquid-testnet.xyz/info";

/// Source of public market data.
pub trait MarketDataSource: Send + Sync {
    fn book<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>>;

    /// Mid prices for every listed symbol.
    fn all_mids(&self) -> BoxFuture<'_, GatewayResult<HashMap<String, Price>>>;

    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>>;

    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>>;
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    px: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    levels: Vec<Vec<RawLevel>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAsset {
    name: String,
    sz_decimals: u32,
    max_leverage: u32,
    #[serde(default)]
    is_delisted: bool,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    universe: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    t: i64,
    o: Decimal,
    h: Decimal,
    l: Decimal,
    c: Decimal,
    v: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CandleRequest<'a> {
    coin: &'a str,
    interval: &'static str,
    start_time: i64,
    end_time: i64,
}

/// Client for the exchange info endpoint.
pub struct InfoClient {
    client: Client,
    info_url: String,
    /// Instrument specs from the last `meta` fetch.
    instruments: DashMap<String, InstrumentSpec>,
}

impl InfoClient {
    /// Create a new info client.
    ///
    /// # Arguments
    /// * `info_url` - URL of the info endpoint (e.g., "https://api.hyperliquid.xyz/info")
    pub fn new(info_url: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::InvalidRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            info_url: info_url.into(),
            instruments: DashMap::new(),
        })
    }

    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    async fn post<T: DeserializeOwned>(&self, body: serde_json::Value) -> GatewayResult<T> {
        let response = self.client.post(&self.info_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GatewayError::Auth(format!("HTTP {status}: {text}")),
                429 | 500..=599 => GatewayError::TransientNetwork(format!("HTTP {status}: {text}")),
                _ => GatewayError::InvalidRequest(format!("HTTP {status}: {text}")),
            });
        }

        Ok(response.json().await?)
    }

    /// Fetch `meta` and refresh the instrument cache.
    pub async fn refresh_instruments(&self) -> GatewayResult<usize> {
        info!(url = %self.info_url, "Fetching instrument metadata");
        let meta: RawMeta = self.post(json!({ "type": "meta" })).await?;

        self.instruments.clear();
        for asset in meta.universe.into_iter().filter(|a| !a.is_delisted) {
            let spec = instrument_from_meta(&asset);
            self.instruments.insert(asset.name, spec);
        }
        debug!(count = self.instruments.len(), "Instrument cache refreshed");
        Ok(self.instruments.len())
    }
}

fn instrument_from_meta(asset: &RawAsset) -> InstrumentSpec {
    let price_decimals = MAX_PERP_PRICE_DECIMALS.saturating_sub(asset.sz_decimals);
    let mut spec = InstrumentSpec::new(
        &asset.name,
        Price::new(Decimal::new(1, price_decimals)),
        Size::new(Decimal::new(1, asset.sz_decimals)),
    );
    spec.max_leverage = asset.max_leverage;
    spec
}

fn book_from_raw(symbol: &str, raw: RawBook) -> GatewayResult<SpreadSnapshot> {
    let best = |side: usize| raw.levels.get(side).and_then(|l| l.first()).map(|l| l.px);
    let (Some(bid), Some(ask)) = (best(0), best(1)) else {
        return Err(GatewayError::NotFound(format!("empty order book for {symbol}")));
    };
    SpreadSnapshot::from_bbo(Price::new(bid), Price::new(ask)).ok_or_else(|| {
        GatewayError::InvalidRequest(format!("crossed order book for {symbol}: {bid} / {ask}"))
    })
}

fn candle_from_raw(raw: RawCandle) -> Option<Candle> {
    Some(Candle {
        open_time: Utc.timestamp_millis_opt(raw.t).single()?,
        open: Price::new(raw.o),
        high: Price::new(raw.h),
        low: Price::new(raw.l),
        close: Price::new(raw.c),
        volume: raw.v,
    })
}

impl MarketDataSource for InfoClient {
    fn book<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<SpreadSnapshot>> {
        Box::pin(async move {
            let raw: Option<RawBook> = self
                .post(json!({ "type": "l2Book", "coin": symbol }))
                .await?;
            let raw =
                raw.ok_or_else(|| GatewayError::NotFound(format!("unknown symbol {symbol}")))?;
            book_from_raw(symbol, raw)
        })
    }

    fn all_mids(&self) -> BoxFuture<'_, GatewayResult<HashMap<String, Price>>> {
        Box::pin(async move {
            let mids: HashMap<String, Decimal> = self.post(json!({ "type": "allMids" })).await?;
            Ok(mids
                .into_iter()
                .map(|(symbol, mid)| (symbol, Price::new(mid)))
                .collect())
        })
    }

    fn instrument<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentSpec>> {
        Box::pin(async move {
            if let Some(spec) = self.instruments.get(symbol) {
                return Ok(spec.clone());
            }
            self.refresh_instruments().await?;
            self.instruments
                .get(symbol)
                .map(|spec| spec.clone())
                .ok_or_else(|| GatewayError::NotFound(format!("unknown symbol {symbol}")))
        })
    }

    fn candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> BoxFuture<'a, GatewayResult<Vec<Candle>>> {
        Box::pin(async move {
            let end = Utc::now();
            let start = candle_window_start(end, timeframe, limit)?;
            let request = CandleRequest {
                coin: symbol,
                interval: timeframe.as_str(),
                start_time: start.timestamp_millis(),
                end_time: end.timestamp_millis(),
            };
            let raw: Vec<RawCandle> = self
                .post(json!({ "type": "candleSnapshot", "req": request }))
                .await?;

            let mut candles: Vec<Candle> = raw.into_iter().filter_map(candle_from_raw).collect();
            candles.sort_by_key(|c| c.open_time);
            let skip = candles.len().saturating_sub(limit);
            debug!(symbol, count = candles.len() - skip, "Fetched candles");
            Ok(candles.into_iter().skip(skip).collect())
        })
    }
}

/// Start of a window holding `limit` closed candles plus the forming one.
fn candle_window_start(
    end: DateTime<Utc>,
    timeframe: Timeframe,
    limit: usize,
) -> GatewayResult<DateTime<Utc>> {
    i32::try_from(limit)
        .ok()
        .and_then(|n| n.checked_add(1))
        .and_then(|n| timeframe.chrono_duration().checked_mul(n))
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| {
            GatewayError::InvalidRequest(format!("candle limit {limit} out of range for {timeframe}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_book_from_raw_takes_best_levels() {
        let raw: RawBook = serde_json::from_str(
            r#"{"coin":"BTC","time":1,"levels":[
                [{"px":"50000.0","sz":"1.0","n":3},{"px":"49999.0","sz":"2.0","n":1}],
                [{"px":"50001.0","sz":"0.5","n":2}]
            ]}"#,
        )
        .unwrap();

        let book = book_from_raw("BTC", raw).unwrap();
        assert_eq!(book.bid.inner(), dec!(50000));
        assert_eq!(book.ask.inner(), dec!(50001));
        assert_eq!(book.mid.inner(), dec!(50000.5));
    }

    #[test]
    fn test_book_from_raw_empty_side_is_not_found() {
        let raw: RawBook = serde_json::from_str(r#"{"levels":[[],[{"px":"1.0"}]]}"#).unwrap();
        assert!(matches!(
            book_from_raw("X", raw),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn test_instrument_from_meta_tick_and_lot() {
        let asset: RawAsset = serde_json::from_str(
            r#"{"name":"ETH","szDecimals":4,"maxLeverage":25}"#,
        )
        .unwrap();
        let spec = instrument_from_meta(&asset);
        assert_eq!(spec.lot_size.inner(), dec!(0.0001));
        assert_eq!(spec.tick_size.inner(), dec!(0.01));
        assert_eq!(spec.max_leverage, 25);
    }

    #[test]
    fn test_candle_window_start() {
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let start = candle_window_start(end, Timeframe::H1, 45).unwrap();
        assert_eq!(end - start, chrono::Duration::hours(46));

        assert!(candle_window_start(end, Timeframe::D1, usize::MAX).is_err());
        assert!(candle_window_start(end, Timeframe::D1, i32::MAX as usize).is_err());
    }

    #[test]
    fn test_candle_from_raw() {
        let raw: RawCandle = serde_json::from_str(
            r#"{"t":1700000000000,"T":1700000899999,"s":"BTC","i":"15m",
                "o":"100.0","c":"101.5","h":"102.0","l":"99.5","v":"12.3","n":40}"#,
        )
        .unwrap();
        let candle = candle_from_raw(raw).unwrap();
        assert_eq!(candle.close.inner(), dec!(101.5));
        assert_eq!(candle.open_time.timestamp(), 1_700_000_000);
    }
}

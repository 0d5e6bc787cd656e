use crate::{
    cascade::Source,
    config::ClientTimeouts,
    error::{Result, SignalError},
    http_client::{as_decimal, as_number, JsonFetcher},
    types::{Derivatives, HistoricalSeries, PricePoint, PriceQuote},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

const SPOT_URL: &str = "https://api.binance.com/api/v3";
const FUTURES_URL: &str = "https://fapi.binance.com";
const SYMBOL: &str = "BTCUSDT";

/// Binance spot market client
pub struct BinanceClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl BinanceClient {
    pub const ID: &'static str = "binance";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    pub async fn get_quote(&self) -> Result<PriceQuote> {
        let url = format!("{}/ticker/24hr?symbol={}", SPOT_URL, SYMBOL);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        let price = as_decimal(&body["lastPrice"])
            .ok_or_else(|| SignalError::ParseError("Binance ticker missing lastPrice".into()))?;

        debug!("Binance price: ${}", price.round());

        Ok(PriceQuote {
            current: price,
            volume_24h: as_decimal(&body["quoteVolume"]).unwrap_or(Decimal::ZERO),
            market_cap: PriceQuote::estimated_market_cap(price),
            change_24h_pct: as_decimal(&body["priceChangePercent"]).unwrap_or(Decimal::ZERO),
        })
    }

    pub async fn get_daily_closes(&self, days: u32) -> Result<HistoricalSeries> {
        let end = Utc::now().timestamp_millis();
        let start = end - i64::from(days) * 86_400_000;
        let url = format!(
            "{}/klines?symbol={}&interval=1d&startTime={}&endTime={}&limit={}",
            SPOT_URL, SYMBOL, start, end, days
        );
        let body = self.fetcher.fetch(&url, self.timeouts.history).await?;
        let klines = body
            .as_array()
            .ok_or_else(|| SignalError::ParseError("Binance klines is not an array".into()))?;

        // [open time ms, open, high, low, close, volume, close time, ...]
        let points = klines
            .iter()
            .filter_map(|kline| {
                Some(PricePoint {
                    timestamp: kline.get(0)?.as_i64()? / 1000,
                    close: kline.get(4).and_then(as_number)?,
                })
            })
            .collect();

        let series = HistoricalSeries::new(points);
        debug!("Binance: {} daily prices loaded", series.len());
        Ok(series)
    }
}

#[async_trait]
impl Source<(), PriceQuote> for BinanceClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<PriceQuote> {
        self.get_quote().await
    }
}

#[async_trait]
impl Source<u32, HistoricalSeries> for BinanceClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, days: &u32) -> Result<HistoricalSeries> {
        self.get_daily_closes(*days).await
    }
}

/// Binance USDⓈ-M futures client for positioning data
pub struct BinanceFuturesClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl BinanceFuturesClient {
    pub const ID: &'static str = "binance_futures";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    /// Latest funding rate in percent
    pub async fn get_funding_rate(&self) -> Result<f64> {
        let url = format!("{}/fapi/v1/fundingRate?symbol={}&limit=1", FUTURES_URL, SYMBOL);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        body.get(0)
            .and_then(|entry| as_number(&entry["fundingRate"]))
            .map(|rate| rate * 100.0)
            .ok_or_else(|| SignalError::ParseError("Binance funding rate missing".into()))
    }

    /// Open interest in BTC
    pub async fn get_open_interest(&self) -> Result<f64> {
        let url = format!("{}/fapi/v1/openInterest?symbol={}", FUTURES_URL, SYMBOL);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        as_number(&body["openInterest"])
            .ok_or_else(|| SignalError::ParseError("Binance open interest missing".into()))
    }

    /// Global long/short account ratio over the last hour
    pub async fn get_long_short_ratio(&self) -> Result<f64> {
        let url = format!(
            "{}/futures/data/globalLongShortAccountRatio?symbol={}&period=1h&limit=1",
            FUTURES_URL, SYMBOL
        );
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        body.get(0)
            .and_then(|entry| as_number(&entry["longShortRatio"]))
            .filter(|ratio| *ratio > 0.0)
            .ok_or_else(|| SignalError::ParseError("Binance long/short ratio missing".into()))
    }

    /// All three figures fetched concurrently. A missing figure keeps its
    /// neutral default; the call only fails when every figure is missing.
    pub async fn get_derivatives(&self) -> Result<Derivatives> {
        let (funding, open_interest, ratio) = tokio::join!(
            self.get_funding_rate(),
            self.get_open_interest(),
            self.get_long_short_ratio()
        );

        if funding.is_err() && open_interest.is_err() && ratio.is_err() {
            return Err(SignalError::provider(Self::ID, "no derivatives data"));
        }

        let defaults = Derivatives::default();
        Ok(Derivatives {
            funding_rate_pct: funding.unwrap_or_else(|e| {
                warn!("Funding rate unavailable: {}", e);
                defaults.funding_rate_pct
            }),
            open_interest: open_interest.unwrap_or_else(|e| {
                warn!("Open interest unavailable: {}", e);
                defaults.open_interest
            }),
            long_short_ratio: ratio.unwrap_or_else(|e| {
                warn!("Long/short ratio unavailable: {}", e);
                defaults.long_short_ratio
            }),
        })
    }
}

#[async_trait]
impl Source<(), Derivatives> for BinanceFuturesClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<Derivatives> {
        self.get_derivatives().await
    }
}

use crate::{
    cascade::Source,
    config::ClientTimeouts,
    error::{Result, SignalError},
    http_client::{as_decimal, as_number, JsonFetcher},
    math::round_dec,
    types::{HistoricalSeries, PricePoint, PriceQuote},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const BASE_URL: &str = "https://api.kraken.com/0/public";

/// Kraken's name for the XBT/USD pair in responses
const PAIR_KEY: &str = "XXBTZUSD";

/// Daily candle interval in minutes
const DAILY_INTERVAL: u32 = 1440;

/// Kraken public REST client. No API key and generous limits, so it leads
/// the price and history chains.
pub struct KrakenClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl KrakenClient {
    pub const ID: &'static str = "kraken";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    pub async fn get_quote(&self) -> Result<PriceQuote> {
        let url = format!("{}/Ticker?pair=XBTUSD", BASE_URL);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;
        let ticker = pair_result(&body)?;

        // c = [last trade price, lot volume]
        let price = ticker["c"]
            .get(0)
            .and_then(as_decimal)
            .ok_or_else(|| SignalError::ParseError("Kraken ticker missing last price".into()))?;

        // v[1] and p[1] are the rolling 24h volume and VWAP
        let volume = match (
            ticker["v"].get(1).and_then(as_decimal),
            ticker["p"].get(1).and_then(as_decimal),
        ) {
            (Some(v), Some(p)) => v * p,
            _ => Decimal::ZERO,
        };

        let open = as_decimal(&ticker["o"]).unwrap_or(Decimal::ZERO);
        let change = if open > Decimal::ZERO {
            round_dec((price / open - Decimal::ONE) * Decimal::ONE_HUNDRED, 2)
        } else {
            Decimal::ZERO
        };

        debug!("Kraken price: ${}", price.round());

        Ok(PriceQuote {
            current: price,
            volume_24h: volume,
            market_cap: PriceQuote::estimated_market_cap(price),
            change_24h_pct: change,
        })
    }

    /// Daily closes covering roughly the last `days` days
    pub async fn get_daily_closes(&self, days: u32) -> Result<HistoricalSeries> {
        let since = Utc::now().timestamp() - i64::from(days) * 86_400;
        let url = format!(
            "{}/OHLC?pair=XBTUSD&interval={}&since={}",
            BASE_URL, DAILY_INTERVAL, since
        );
        let body = self.fetcher.fetch(&url, self.timeouts.history).await?;
        let candles = pair_result(&body)?
            .as_array()
            .ok_or_else(|| SignalError::ParseError("Kraken OHLC is not an array".into()))?;

        // [time, open, high, low, close, vwap, volume, count]
        let points = candles
            .iter()
            .filter_map(|candle| {
                Some(PricePoint {
                    timestamp: candle.get(0)?.as_i64()?,
                    close: candle.get(4).and_then(as_number)?,
                })
            })
            .collect();

        let series = HistoricalSeries::new(points);
        debug!("Kraken: {} daily prices loaded", series.len());
        Ok(series)
    }
}

/// `result.XXBTZUSD` of a Kraken response, after checking the error list
fn pair_result(body: &Value) -> Result<&Value> {
    if let Some(errors) = body["error"].as_array() {
        if !errors.is_empty() {
            return Err(SignalError::provider(
                KrakenClient::ID,
                format!("{:?}", errors),
            ));
        }
    }

    body.get("result")
        .and_then(|r| r.get(PAIR_KEY))
        .ok_or_else(|| SignalError::ParseError(format!("Kraken response missing result.{}", PAIR_KEY)))
}

#[async_trait]
impl Source<(), PriceQuote> for KrakenClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<PriceQuote> {
        self.get_quote().await
    }
}

#[async_trait]
impl Source<u32, HistoricalSeries> for KrakenClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, days: &u32) -> Result<HistoricalSeries> {
        self.get_daily_closes(*days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::StaticFetcher;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn client(fetcher: StaticFetcher) -> KrakenClient {
        KrakenClient::new(Arc::new(fetcher), ClientTimeouts::default())
    }

    #[tokio::test]
    async fn test_quote_normalized() {
        let fetcher = StaticFetcher::new().json(
            "/Ticker",
            json!({
                "error": [],
                "result": {
                    "XXBTZUSD": {
                        "c": ["66000.00000", "0.01"],
                        "v": ["100.0", "2000.0"],
                        "p": ["65500.0", "65000.0"],
                        "o": "64000.00000"
                    }
                }
            }),
        );

        let quote = client(fetcher).get_quote().await.unwrap();

        assert_eq!(quote.current, dec!(66000));
        assert_eq!(quote.volume_24h, dec!(130000000));
        assert_eq!(quote.market_cap, dec!(66000) * dec!(19820000));
        // 66000 / 64000 - 1 = 3.125%
        assert_eq!(quote.change_24h_pct, dec!(3.13));
    }

    #[tokio::test]
    async fn test_api_error_is_failure() {
        let fetcher = StaticFetcher::new().json(
            "/Ticker",
            json!({"error": ["EGeneral:Too many requests"], "result": {}}),
        );

        assert!(client(fetcher).get_quote().await.is_err());
    }

    #[tokio::test]
    async fn test_daily_closes() {
        let fetcher = StaticFetcher::new().json(
            "/OHLC",
            json!({
                "error": [],
                "result": {
                    "XXBTZUSD": [
                        [1700006400, "1", "1", "1", "101.5", "1", "1", 10],
                        [1699920000, "1", "1", "1", "100.0", "1", "1", 10],
                        [1700092800, "1", "1", "1", "bad", "1", "1", 10]
                    ],
                    "last": 1700092800
                }
            }),
        );

        let series = client(fetcher).get_daily_closes(365).await.unwrap();
        assert_eq!(series.closes(), vec![100.0, 101.5]);
    }
}

use crate::{
    cascade::Source,
    config::ClientTimeouts,
    error::{Result, SignalError},
    http_client::{as_decimal, as_number, JsonFetcher},
    math::round_dec,
    types::{Dominance, HistoricalSeries, PricePoint, PriceQuote, Supply, MAX_SUPPLY},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko public API client. Rate limited hard on the free tier, so it
/// sits behind the exchange feeds for price and history.
pub struct CoingeckoClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl CoingeckoClient {
    pub const ID: &'static str = "coingecko";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    pub async fn get_quote(&self) -> Result<PriceQuote> {
        let url = format!(
            "{}/simple/price?ids=bitcoin&vs_currencies=usd&include_24hr_vol=true&include_market_cap=true&include_24hr_change=true",
            BASE_URL
        );
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;
        let bitcoin = body
            .get("bitcoin")
            .ok_or_else(|| SignalError::ParseError("CoinGecko response missing bitcoin".into()))?;

        let price = as_decimal(&bitcoin["usd"]).unwrap_or(Decimal::ZERO);
        debug!("CoinGecko price: ${}", price.round());

        Ok(PriceQuote {
            current: price,
            volume_24h: as_decimal(&bitcoin["usd_24h_vol"]).unwrap_or(Decimal::ZERO),
            market_cap: as_decimal(&bitcoin["usd_market_cap"]).unwrap_or(Decimal::ZERO),
            change_24h_pct: as_decimal(&bitcoin["usd_24h_change"])
                .map(|c| round_dec(c, 2))
                .unwrap_or(Decimal::ZERO),
        })
    }

    pub async fn get_daily_closes(&self, days: u32) -> Result<HistoricalSeries> {
        let url = format!(
            "{}/coins/bitcoin/market_chart?vs_currency=usd&days={}&interval=daily",
            BASE_URL, days
        );
        let body = self.fetcher.fetch(&url, self.timeouts.history).await?;
        let prices = body["prices"]
            .as_array()
            .ok_or_else(|| SignalError::ParseError("CoinGecko market chart missing prices".into()))?;

        // [timestamp ms, price]
        let points = prices
            .iter()
            .filter_map(|pair| {
                Some(PricePoint {
                    timestamp: pair.get(0).and_then(as_number)? as i64 / 1000,
                    close: pair.get(1).and_then(as_number)?,
                })
            })
            .collect();

        let series = HistoricalSeries::new(points);
        debug!("CoinGecko: {} daily prices loaded", series.len());
        Ok(series)
    }

    /// BTC share of the total crypto market cap
    pub async fn get_dominance(&self) -> Result<Dominance> {
        let url = format!("{}/global", BASE_URL);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;
        let data = body
            .get("data")
            .ok_or_else(|| SignalError::ParseError("CoinGecko global missing data".into()))?;

        Ok(Dominance {
            btc_dominance: as_number(&data["market_cap_percentage"]["btc"])
                .ok_or_else(|| SignalError::ParseError("CoinGecko global missing btc share".into()))?,
            total_market_cap: as_number(&data["total_market_cap"]["usd"]).unwrap_or(0.0),
        })
    }

    pub async fn get_supply(&self) -> Result<Supply> {
        let url = format!(
            "{}/coins/bitcoin?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=false",
            BASE_URL
        );
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;
        let market = &body["market_data"];

        Ok(Supply {
            circulating: as_number(&market["circulating_supply"])
                .ok_or_else(|| SignalError::ParseError("CoinGecko missing circulating supply".into()))?,
            total: as_number(&market["total_supply"]).unwrap_or(MAX_SUPPLY as f64),
        })
    }
}

#[async_trait]
impl Source<(), PriceQuote> for CoingeckoClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<PriceQuote> {
        self.get_quote().await
    }
}

#[async_trait]
impl Source<u32, HistoricalSeries> for CoingeckoClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, days: &u32) -> Result<HistoricalSeries> {
        self.get_daily_closes(*days).await
    }
}

#[async_trait]
impl Source<(), Dominance> for CoingeckoClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<Dominance> {
        self.get_dominance().await
    }
}

#[async_trait]
impl Source<(), Supply> for CoingeckoClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<Supply> {
        self.get_supply().await
    }
}

use crate::{
    cascade::Source,
    config::ClientTimeouts,
    error::{Result, SignalError},
    http_client::{as_decimal, as_number, JsonFetcher},
    types::{ChainMetrics, PriceQuote, Supply, MAX_SUPPLY},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

const BASE_URL: &str = "https://blockchain.info";

const SATOSHIS_PER_BTC: f64 = 100_000_000.0;

/// Blockchain.info client. The `/q/*` endpoints answer with a bare number.
pub struct BlockchainClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl BlockchainClient {
    pub const ID: &'static str = "blockchain_info";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    /// Last USD price from the exchange ticker. Only the price is reported.
    pub async fn get_quote(&self) -> Result<PriceQuote> {
        let url = format!("{}/ticker", BASE_URL);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        let price = as_decimal(&body["USD"]["last"])
            .ok_or_else(|| SignalError::ParseError("Blockchain.info ticker missing USD.last".into()))?;

        debug!("Blockchain.info price: ${}", price.round());

        Ok(PriceQuote {
            current: price,
            volume_24h: Decimal::ZERO,
            market_cap: PriceQuote::estimated_market_cap(price),
            change_24h_pct: Decimal::ZERO,
        })
    }

    /// Positive bare-number answer of a `/q/` query
    async fn query(&self, name: &str) -> Result<f64> {
        let url = format!("{}/q/{}", BASE_URL, name);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        as_number(&body)
            .filter(|n| *n > 0.0)
            .ok_or_else(|| SignalError::ParseError(format!("Blockchain.info /q/{} not a positive number", name)))
    }

    /// Hash rate (GH/s) and difficulty, fetched concurrently. Each figure
    /// falls back to zero on its own; the call fails only if both do.
    pub async fn get_chain_metrics(&self) -> Result<ChainMetrics> {
        let (hash_rate, difficulty) = tokio::join!(self.query("hashrate"), self.query("getdifficulty"));

        if hash_rate.is_err() && difficulty.is_err() {
            return Err(SignalError::provider(Self::ID, "no chain metrics"));
        }

        Ok(ChainMetrics {
            hash_rate: hash_rate.unwrap_or_else(|e| {
                warn!("Hash rate unavailable: {}", e);
                0.0
            }),
            difficulty: difficulty.unwrap_or_else(|e| {
                warn!("Difficulty unavailable: {}", e);
                0.0
            }),
        })
    }

    pub async fn get_supply(&self) -> Result<Supply> {
        let satoshis = self.query("totalbc").await?;

        Ok(Supply {
            circulating: satoshis / SATOSHIS_PER_BTC,
            total: MAX_SUPPLY as f64,
        })
    }
}

#[async_trait]
impl Source<(), PriceQuote> for BlockchainClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<PriceQuote> {
        self.get_quote().await
    }
}

#[async_trait]
impl Source<(), ChainMetrics> for BlockchainClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<ChainMetrics> {
        self.get_chain_metrics().await
    }
}

#[async_trait]
impl Source<(), Supply> for BlockchainClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<Supply> {
        self.get_supply().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::StaticFetcher;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn client(fetcher: StaticFetcher) -> BlockchainClient {
        BlockchainClient::new(Arc::new(fetcher), ClientTimeouts::default())
    }

    #[tokio::test]
    async fn test_ticker_quote() {
        let fetcher = StaticFetcher::new().json(
            "/ticker",
            json!({"USD": {"15m": 65010.0, "last": 65000.5, "symbol": "$"}}),
        );

        let quote = client(fetcher).get_quote().await.unwrap();
        assert_eq!(quote.current, dec!(65000.5));
        assert_eq!(quote.volume_24h, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_bare_number_metrics() {
        let fetcher = StaticFetcher::new()
            .body("/q/hashrate", "650123456789.5")
            .body("/q/getdifficulty", "83148355189239.77");

        let metrics = client(fetcher).get_chain_metrics().await.unwrap();
        assert_eq!(metrics.hash_rate, 650123456789.5);
        assert_eq!(metrics.difficulty, 83148355189239.77);
    }

    #[tokio::test]
    async fn test_metrics_fall_back_per_field() {
        let fetcher = StaticFetcher::new()
            .body("/q/hashrate", "0")
            .body("/q/getdifficulty", "83148355189239.77");

        let metrics = client(fetcher).get_chain_metrics().await.unwrap();
        assert_eq!(metrics.hash_rate, 0.0);
        assert!(metrics.difficulty > 0.0);

        let fetcher = StaticFetcher::new().body("/q/hashrate", "Rate limited");
        assert!(client(fetcher).get_chain_metrics().await.is_err());
    }

    #[tokio::test]
    async fn test_supply_from_satoshis() {
        let fetcher = StaticFetcher::new().body("/q/totalbc", "1985000000000000");

        let supply = client(fetcher).get_supply().await.unwrap();
        assert_eq!(supply.circulating, 19_850_000.0);
        assert_eq!(supply.total, 21_000_000.0);
    }
}

use crate::{
    cascade::Source,
    config::ClientTimeouts,
    error::{Result, SignalError},
    http_client::{as_number, JsonFetcher},
    types::{HistoricalSeries, MarketIndex, PricePoint},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart client for macro indices
pub struct YahooClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl YahooClient {
    pub const ID: &'static str = "yahoo";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    /// One month of daily closes. Days without a close (holidays) are skipped.
    pub async fn get_index_series(&self, index: MarketIndex) -> Result<HistoricalSeries> {
        let symbol = index.symbol().replace('^', "%5E");
        let url = format!("{}/{}?range=1mo&interval=1d", BASE_URL, symbol);
        let body = self.fetcher.fetch(&url, self.timeouts.index).await?;

        let result = &body["chart"]["result"][0];
        let timestamps = result["timestamp"]
            .as_array()
            .ok_or_else(|| SignalError::ParseError(format!("Yahoo {} missing timestamps", index.symbol())))?;
        let closes = result["indicators"]["quote"][0]["close"]
            .as_array()
            .ok_or_else(|| SignalError::ParseError(format!("Yahoo {} missing closes", index.symbol())))?;

        let points = timestamps
            .iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                Some(PricePoint {
                    timestamp: ts.as_i64()?,
                    close: as_number(close)?,
                })
            })
            .collect();

        let series = HistoricalSeries::new(points);
        debug!("Yahoo {}: {} closes", index.symbol(), series.len());
        Ok(series)
    }
}

#[async_trait]
impl Source<MarketIndex, HistoricalSeries> for YahooClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, index: &MarketIndex) -> Result<HistoricalSeries> {
        self.get_index_series(*index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::StaticFetcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_chart_skips_null_closes() {
        let fetcher = StaticFetcher::new().json(
            "/%5EGSPC?",
            json!({"chart": {"result": [{
                "timestamp": [1699392600, 1699479000, 1699565400],
                "indicators": {"quote": [{"close": [4378.38, null, 4415.24]}]}
            }], "error": null}}),
        );
        let client = YahooClient::new(Arc::new(fetcher), ClientTimeouts::default());

        let series = client.get_index_series(MarketIndex::Sp500).await.unwrap();
        assert_eq!(series.closes(), vec![4378.38, 4415.24]);
    }

    #[tokio::test]
    async fn test_missing_chart_is_failure() {
        let fetcher = StaticFetcher::new().json(
            "/DX-Y.NYB?",
            json!({"chart": {"result": null, "error": {"code": "Not Found"}}}),
        );
        let client = YahooClient::new(Arc::new(fetcher), ClientTimeouts::default());

        assert!(client.get_index_series(MarketIndex::Dxy).await.is_err());
    }
}

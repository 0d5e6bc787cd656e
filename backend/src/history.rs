use crate::{
    cache::TtlCache,
    error::Result,
    gateway::ProviderGateway,
    types::{HistoricalDay, MAX_SERIES_LEN},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Day count used when the query is missing, unparseable or zero
pub const DEFAULT_DAYS: u32 = 30;

/// Fear & Greed assumed for dates the index does not cover
const NEUTRAL_FEAR_GREED: u8 = 50;

/// Normalize the `days` query parameter to 1..=365
pub fn parse_days(raw: Option<&str>) -> u32 {
    let days = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|d| *d != 0)
        .unwrap_or(i64::from(DEFAULT_DAYS));

    days.clamp(1, MAX_SERIES_LEN as i64) as u32
}

/// Contrarian daily score: extreme fear maps to 100, extreme greed to 0
pub fn buy_score(fear_greed: u8) -> u8 {
    (100 - i32::from(fear_greed)).clamp(0, 100) as u8
}

/// Daily price and sentiment rows for the dashboard chart, cached per day count
pub struct HistoryService {
    gateway: Arc<ProviderGateway>,
    cache: TtlCache<u32, Vec<HistoricalDay>>,
    ttl: Duration,
}

impl HistoryService {
    pub fn new(gateway: Arc<ProviderGateway>, ttl: Duration) -> Self {
        Self {
            gateway,
            cache: TtlCache::new("historical"),
            ttl,
        }
    }

    /// Rows for the last `days` days. Empty when no price history has ever
    /// been fetched for this day count.
    pub async fn range(&self, days: u32) -> Vec<HistoricalDay> {
        match self
            .cache
            .get_or_refresh(days, self.ttl, || self.build(days))
            .await
        {
            Ok(entry) => entry.value,
            Err(e) => {
                error!("Historical range for {} days unavailable: {}", days, e);
                Vec::new()
            }
        }
    }

    async fn build(&self, days: u32) -> Result<Vec<HistoricalDay>> {
        let (series, fear_greed) = tokio::join!(
            self.gateway.fetch_historical_series(days, 1),
            self.gateway.fetch_sentiment_history(days),
        );
        let series = series?;

        let rows = series
            .tail(days as usize)
            .iter()
            .filter_map(|point| {
                let date = point.date()?;
                let fg = fear_greed.get(&date).copied().unwrap_or(NEUTRAL_FEAR_GREED);
                Some(HistoricalDay {
                    date,
                    price: point.close.round() as i64,
                    buy_score: buy_score(fg),
                    fear_greed: fg,
                    rsi: None,
                })
            })
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientTimeouts, ProviderOrder};
    use crate::http_client::testing::StaticFetcher;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(None), 30);
        assert_eq!(parse_days(Some("abc")), 30);
        assert_eq!(parse_days(Some("0")), 30);
        assert_eq!(parse_days(Some("7")), 7);
        assert_eq!(parse_days(Some("1000")), 365);
        assert_eq!(parse_days(Some("-5")), 1);
    }

    #[test]
    fn test_buy_score_is_contrarian() {
        assert_eq!(buy_score(50), 50);
        assert_eq!(buy_score(10), 90);
        assert_eq!(buy_score(85), 15);
        assert_eq!(buy_score(0), 100);
        assert_eq!(buy_score(100), 0);
    }

    fn service(fetcher: Arc<StaticFetcher>) -> HistoryService {
        let gateway =
            ProviderGateway::new(&ProviderOrder::default(), ClientTimeouts::default(), fetcher).unwrap();
        HistoryService::new(Arc::new(gateway), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_rows_join_price_and_sentiment() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .json(
                    "/OHLC",
                    json!({"error": [], "result": {"XXBTZUSD": [
                        [1699920000, "1", "1", "1", "36500.4", "1", "1", 1],
                        [1700006400, "1", "1", "1", "37000.6", "1", "1", 1]
                    ]}}),
                )
                .json(
                    "fng/?limit=2",
                    json!({"data": [{"value": "20", "timestamp": "1700006400"}]}),
                ),
        );
        let rows = service(fetcher.clone()).range(2).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(rows[0].price, 36500);
        assert_eq!(rows[0].fear_greed, 50);
        assert_eq!(rows[0].buy_score, 50);
        assert_eq!(rows[1].price, 37001);
        assert_eq!(rows[1].fear_greed, 20);
        assert_eq!(rows[1].buy_score, 80);
        assert_eq!(rows[1].rsi, None);
    }

    #[tokio::test]
    async fn test_cached_per_day_count() {
        let fetcher = Arc::new(StaticFetcher::new().json(
            "/OHLC",
            json!({"error": [], "result": {"XXBTZUSD": [[1700006400, "1", "1", "1", "37000", "1", "1", 1]]}}),
        ));
        let service = service(fetcher.clone());

        service.range(7).await;
        service.range(7).await;
        service.range(30).await;

        assert_eq!(fetcher.calls_matching("/OHLC"), 2);
    }

    #[tokio::test]
    async fn test_cold_failure_is_empty() {
        let rows = service(Arc::new(StaticFetcher::new())).range(30).await;
        assert!(rows.is_empty());
    }
}

use crate::{
    cascade::Source,
    config::ClientTimeouts,
    error::{Result, SignalError},
    http_client::{as_number, JsonFetcher},
    types::{Sentiment, SentimentHistory},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const BASE_URL: &str = "https://api.alternative.me/fng/";

/// Alternative.me Fear & Greed index client
pub struct AlternativeClient {
    fetcher: Arc<dyn JsonFetcher>,
    timeouts: ClientTimeouts,
}

impl AlternativeClient {
    pub const ID: &'static str = "alternative_me";

    pub fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self { fetcher, timeouts }
    }

    async fn entries(&self, limit: u32) -> Result<Vec<Value>> {
        let url = format!("{}?limit={}", BASE_URL, limit);
        let body = self.fetcher.fetch(&url, self.timeouts.request).await?;

        body["data"]
            .as_array()
            .cloned()
            .ok_or_else(|| SignalError::ParseError("Fear & Greed response missing data".into()))
    }

    /// Today's reading
    pub async fn get_sentiment(&self) -> Result<Sentiment> {
        let entries = self.entries(1).await?;
        let latest = entries
            .first()
            .ok_or_else(|| SignalError::NoData("Fear & Greed returned no entries".into()))?;

        let sentiment = Sentiment {
            value: index_value(latest)
                .ok_or_else(|| SignalError::ParseError("Fear & Greed value out of range".into()))?,
            classification: latest["value_classification"]
                .as_str()
                .unwrap_or("Neutral")
                .to_string(),
        };

        debug!("Fear & Greed: {} ({})", sentiment.value, sentiment.classification);
        Ok(sentiment)
    }

    /// Daily readings for the last `days` days keyed by UTC date
    pub async fn get_history(&self, days: u32) -> Result<SentimentHistory> {
        let entries = self.entries(days).await?;

        let history: SentimentHistory = entries
            .iter()
            .filter_map(|entry| {
                let timestamp = as_number(&entry["timestamp"])? as i64;
                let date = DateTime::<Utc>::from_timestamp(timestamp, 0)?.date_naive();
                Some((date, index_value(entry)?))
            })
            .collect();

        debug!("Fear & Greed: {} daily readings loaded", history.len());
        Ok(history)
    }
}

/// The `value` field (a numeric string) when it lies in 0..=100
fn index_value(entry: &Value) -> Option<u8> {
    as_number(&entry["value"])
        .filter(|v| (0.0..=100.0).contains(v))
        .map(|v| v.round() as u8)
}

#[async_trait]
impl Source<(), Sentiment> for AlternativeClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, _request: &()) -> Result<Sentiment> {
        self.get_sentiment().await
    }
}

#[async_trait]
impl Source<u32, SentimentHistory> for AlternativeClient {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn fetch(&self, days: &u32) -> Result<SentimentHistory> {
        self.get_history(*days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::testing::StaticFetcher;
    use chrono::NaiveDate;
    use serde_json::json;

    fn client(fetcher: StaticFetcher) -> AlternativeClient {
        AlternativeClient::new(Arc::new(fetcher), ClientTimeouts::default())
    }

    #[tokio::test]
    async fn test_current_reading() {
        let fetcher = StaticFetcher::new().json(
            "limit=1",
            json!({"name": "Fear and Greed Index", "data": [
                {"value": "22", "value_classification": "Extreme Fear", "timestamp": "1700006400"}
            ]}),
        );

        let sentiment = client(fetcher).get_sentiment().await.unwrap();
        assert_eq!(sentiment.value, 22);
        assert_eq!(sentiment.classification, "Extreme Fear");
    }

    #[tokio::test]
    async fn test_out_of_range_is_failure() {
        let fetcher = StaticFetcher::new().json(
            "limit=1",
            json!({"data": [{"value": "140", "value_classification": "?", "timestamp": "1700006400"}]}),
        );
        assert!(client(fetcher).get_sentiment().await.is_err());

        let fetcher = StaticFetcher::new().json("limit=1", json!({"data": []}));
        assert!(client(fetcher).get_sentiment().await.is_err());
    }

    #[tokio::test]
    async fn test_history_by_date() {
        let fetcher = StaticFetcher::new().json(
            "limit=3",
            json!({"data": [
                {"value": "40", "timestamp": "1700092800"},
                {"value": "35", "timestamp": "1700006400"},
                {"value": "bad", "timestamp": "1699920000"}
            ]}),
        );

        let history = client(fetcher).get_history(3).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[&NaiveDate::from_ymd_opt(2023, 11, 15).unwrap()], 35);
    }
}

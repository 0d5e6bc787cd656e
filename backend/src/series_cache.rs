use crate::cache::TtlCache;
use crate::gateway::ProviderGateway;
use crate::types::{HistoricalSeries, MAX_SERIES_LEN};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A series shorter than this is treated as a failed fetch
const MIN_SERIES_LEN: usize = 11;

/// Canonical 365-day daily price series shared by every indicator.
///
/// Refreshed wholesale when older than the TTL. Smaller windows are served
/// from the same series; callers take the suffix they need.
pub struct HistoricalSeriesCache {
    gateway: Arc<ProviderGateway>,
    cache: TtlCache<(), HistoricalSeries>,
    ttl: Duration,
}

impl HistoricalSeriesCache {
    pub fn new(gateway: Arc<ProviderGateway>, ttl: Duration) -> Self {
        Self {
            gateway,
            cache: TtlCache::new("series"),
            ttl,
        }
    }

    /// The canonical series; empty only if no provider has ever delivered one
    pub async fn get(&self, days: usize) -> HistoricalSeries {
        let entry = self
            .cache
            .get_or_refresh((), self.ttl, || {
                self.gateway
                    .fetch_historical_series(MAX_SERIES_LEN as u32, MIN_SERIES_LEN)
            })
            .await;

        match entry {
            Ok(entry) => {
                if entry.value.len() < days {
                    debug!("Series has {} of {} requested days", entry.value.len(), days);
                }
                entry.value
            }
            Err(e) => {
                warn!("No price history available: {}", e);
                HistoricalSeries::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientTimeouts, ProviderOrder};
    use crate::http_client::testing::StaticFetcher;
    use serde_json::json;

    fn kraken_candles(days: i64) -> serde_json::Value {
        let candles: Vec<_> = (0..days)
            .map(|d| json!([1_690_000_000i64 + d * 86_400, "1", "1", "1", "30000", "1", "1", 1]))
            .collect();
        json!({"error": [], "result": {"XXBTZUSD": candles}})
    }

    fn series_cache(fetcher: Arc<StaticFetcher>) -> HistoricalSeriesCache {
        let gateway =
            ProviderGateway::new(&ProviderOrder::default(), ClientTimeouts::default(), fetcher).unwrap();
        HistoricalSeriesCache::new(Arc::new(gateway), Duration::from_secs(1800))
    }

    #[tokio::test]
    async fn test_fetched_once_within_ttl() {
        let fetcher = Arc::new(StaticFetcher::new().json("/OHLC", kraken_candles(365)));
        let cache = series_cache(fetcher.clone());

        assert_eq!(cache.get(365).await.len(), 365);
        assert_eq!(cache.get(30).await.len(), 365);
        assert_eq!(fetcher.calls_matching("/OHLC"), 1);
    }

    #[tokio::test]
    async fn test_cold_failure_is_empty() {
        let cache = series_cache(Arc::new(StaticFetcher::new()));
        assert!(cache.get(365).await.is_empty());
    }
}

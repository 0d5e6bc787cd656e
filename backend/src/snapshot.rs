//! Snapshot Assembler
//!
//! One refresh cycle: fan out to every gateway operation and the series cache
//! concurrently, then compute indicators, the composite score and the
//! portfolio valuation, and stamp the result. Every gateway operation is
//! fallback-safe, so the join itself never fails; the only cycle-level failure
//! is an unknown price.
//!
//! # Architecture
//! ```text
//! ┌ price ┐
//! ├ sentiment, supply, dominance ┤
//! ├ chain, derivatives           ┼──► indicators ──► score ──► Snapshot
//! ├ DXY, S&P 500                 ┤        ▲
//! └ 365d series (cached) ────────┘        └── portfolio valuation
//! ```

use crate::{
    cache::TtlCache,
    config::PortfolioConfig,
    error::{Result, SignalError},
    gateway::ProviderGateway,
    indicators::{self, MarketInputs},
    math::round_dec,
    scoring::WeightTable,
    series_cache::HistoricalSeriesCache,
    types::{MarketIndex, Portfolio, Snapshot, MAX_SERIES_LEN},
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds one [`Snapshot`] per call
pub struct SnapshotAssembler {
    gateway: Arc<ProviderGateway>,
    series: Arc<HistoricalSeriesCache>,
    weights: WeightTable,
    portfolio: PortfolioConfig,
}

impl SnapshotAssembler {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        series: Arc<HistoricalSeriesCache>,
        weights: WeightTable,
        portfolio: PortfolioConfig,
    ) -> Self {
        Self {
            gateway,
            series,
            weights,
            portfolio,
        }
    }

    /// Run one refresh cycle
    ///
    /// # Errors
    /// * `NoData` - every price provider failed; a snapshot valued at $0 is never built
    pub async fn build(&self) -> Result<Snapshot> {
        let gateway = &self.gateway;
        let (quote, sentiment, supply, dominance, chain, derivatives, dxy, sp500, series) = tokio::join!(
            gateway.fetch_price(),
            gateway.fetch_sentiment(),
            gateway.fetch_supply(),
            gateway.fetch_dominance(),
            gateway.fetch_chain_metrics(),
            gateway.fetch_derivatives(),
            gateway.fetch_index_series(MarketIndex::Dxy),
            gateway.fetch_index_series(MarketIndex::Sp500),
            self.series.get(MAX_SERIES_LEN),
        );

        if !quote.is_known() {
            return Err(SignalError::NoData("BTC price unavailable from every provider".into()));
        }

        let now = Utc::now();
        let indicators = indicators::compute_all(&MarketInputs {
            price: quote.current.to_f64().unwrap_or(0.0),
            series: &series,
            supply,
            sentiment: &sentiment,
            dominance,
            chain,
            derivatives,
            dxy: &dxy,
            sp500: &sp500,
            now,
        });
        let composite = self.weights.score(&indicators);
        let portfolio = value_portfolio(&self.portfolio, quote.current);

        info!(
            "Snapshot built: ${} | score {} ({:?}) | {} closes",
            quote.current.round(),
            composite.score,
            composite.signal,
            series.len()
        );

        Ok(Snapshot {
            price: quote,
            portfolio,
            indicators,
            composite,
            updated_at: now,
        })
    }
}

/// Value the configured holdings at `price`
pub fn value_portfolio(config: &PortfolioConfig, price: Decimal) -> Portfolio {
    let invested = config.btc_amount * config.avg_price;
    let value = config.btc_amount * price;

    let pnl_percent = if invested.is_zero() {
        Decimal::ZERO
    } else {
        round_dec((value / invested - Decimal::ONE) * Decimal::ONE_HUNDRED, 2)
    };

    Portfolio {
        btc_amount: config.btc_amount,
        avg_price: config.avg_price,
        invested,
        current_value: round_dec(value, 0),
        pnl_usd: round_dec(value - invested, 0),
        pnl_percent,
    }
}

/// Short-TTL cache in front of the assembler
pub struct SnapshotService {
    assembler: SnapshotAssembler,
    cache: TtlCache<(), Snapshot>,
    ttl: Duration,
}

impl SnapshotService {
    pub fn new(assembler: SnapshotAssembler, ttl: Duration) -> Self {
        Self {
            assembler,
            cache: TtlCache::new("snapshot"),
            ttl,
        }
    }

    /// Latest snapshot, rebuilt when older than the TTL. A failed rebuild
    /// serves the previous snapshot unchanged.
    ///
    /// # Errors
    /// Only when no snapshot has ever been built
    pub async fn latest(&self) -> Result<Snapshot> {
        let entry = self
            .cache
            .get_or_refresh((), self.ttl, || self.assembler.build())
            .await?;
        Ok(entry.value)
    }

    /// When the cached snapshot was last rebuilt
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.cache.last_refreshed(&())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientTimeouts, ProviderOrder};
    use crate::http_client::{testing::StaticFetcher, JsonFetcher};
    use crate::types::{IndicatorId, Signal};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to canned routes until switched off
    struct SwitchableFetcher {
        inner: StaticFetcher,
        down: AtomicBool,
    }

    #[async_trait]
    impl JsonFetcher for SwitchableFetcher {
        async fn fetch(&self, url: &str, timeout: Duration) -> Result<Value> {
            if self.down.load(Ordering::SeqCst) {
                return Err(SignalError::provider(url, "connection refused"));
            }
            self.inner.fetch(url, timeout).await
        }
    }

    fn kraken_ticker(price: &str) -> Value {
        json!({"error": [], "result": {"XXBTZUSD": {
            "c": [price, "0.1"], "v": ["1", "1"], "p": [price, price], "o": price
        }}})
    }

    fn assembler(fetcher: Arc<dyn JsonFetcher>) -> SnapshotAssembler {
        let gateway = Arc::new(
            ProviderGateway::new(&ProviderOrder::default(), ClientTimeouts::default(), fetcher).unwrap(),
        );
        let series = Arc::new(HistoricalSeriesCache::new(gateway.clone(), Duration::from_secs(1800)));
        SnapshotAssembler::new(gateway, series, WeightTable::default(), PortfolioConfig::default())
    }

    #[test]
    fn test_portfolio_valuation() {
        let portfolio = value_portfolio(&PortfolioConfig::default(), dec!(65000));

        assert_eq!(portfolio.current_value, dec!(63830000));
        assert_eq!(portfolio.invested, dec!(64014616));
        assert_eq!(portfolio.pnl_usd, dec!(-184616));
        assert_eq!(portfolio.pnl_percent, dec!(-0.29));
    }

    #[test]
    fn test_portfolio_without_cost_basis() {
        let config = PortfolioConfig {
            btc_amount: dec!(1),
            avg_price: Decimal::ZERO,
        };
        let portfolio = value_portfolio(&config, dec!(65000));

        assert_eq!(portfolio.pnl_percent, Decimal::ZERO);
        assert_eq!(portfolio.pnl_usd, dec!(65000));
    }

    #[tokio::test]
    async fn test_build_with_only_price_available() {
        let fetcher = Arc::new(StaticFetcher::new().json("/Ticker", kraken_ticker("65000")));
        let snapshot = assembler(fetcher).build().await.unwrap();

        assert_eq!(snapshot.price.current, dec!(65000));
        assert_eq!(snapshot.portfolio.current_value, dec!(63830000));
        assert_eq!(snapshot.portfolio.pnl_percent, dec!(-0.29));
        assert_eq!(snapshot.indicators.len(), IndicatorId::ALL.len());
        assert_eq!(snapshot.indicators[&IndicatorId::FearGreed].value, 50.0);
        assert_eq!(snapshot.indicators[&IndicatorId::Sp500].signal, Signal::Neutral);
        assert!(snapshot.composite.score <= 100);
    }

    #[tokio::test]
    async fn test_unknown_price_fails_cycle() {
        let result = assembler(Arc::new(StaticFetcher::new())).build().await;
        assert!(matches!(result, Err(SignalError::NoData(_))));
    }

    #[tokio::test]
    async fn test_stale_snapshot_served_when_refresh_fails() {
        let fetcher = Arc::new(SwitchableFetcher {
            inner: StaticFetcher::new().json("/Ticker", kraken_ticker("65000")),
            down: AtomicBool::new(false),
        });
        let service = SnapshotService::new(assembler(fetcher.clone()), Duration::ZERO);

        let first = service.latest().await.unwrap();
        fetcher.down.store(true, Ordering::SeqCst);
        let second = service.latest().await.unwrap();

        assert_eq!(second, first);
        assert_eq!(second.updated_at, first.updated_at);
        assert!(service.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn test_cold_start_failure_is_error() {
        let service = SnapshotService::new(assembler(Arc::new(StaticFetcher::new())), Duration::from_secs(60));

        assert!(service.latest().await.is_err());
        assert!(service.last_refreshed().is_none());
    }
}

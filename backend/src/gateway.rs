//! Provider Gateway
//!
//! One entry point per logical fetch. Each operation owns a [`Cascade`] built
//! from the configured provider order, so reordering or removing a provider is
//! a configuration change. Every operation except history is infallible: on
//! total exhaustion it returns the neutral default for its data type.
//!
//! # Architecture
//! ```text
//!                 ┌─► price        kraken → binance → coingecko → blockchain_info
//!                 ├─► history      kraken → binance → coingecko
//! ProviderGateway ├─► sentiment    alternative_me
//!                 ├─► supply       blockchain_info → coingecko
//!                 ├─► dominance    coingecko
//!                 ├─► chain        blockchain_info
//!                 ├─► derivatives  binance_futures
//!                 └─► index        yahoo
//! ```

use crate::{
    alternative_client::AlternativeClient,
    binance_client::{BinanceClient, BinanceFuturesClient},
    blockchain_client::BlockchainClient,
    cascade::{Cascade, ProviderStats, Source},
    coingecko_client::CoingeckoClient,
    config::{ClientTimeouts, ProviderOrder},
    error::{Result, SignalError},
    http_client::JsonFetcher,
    kraken_client::KrakenClient,
    types::{
        ChainMetrics, Derivatives, Dominance, HistoricalSeries, MarketIndex, PriceQuote,
        ProviderHealth, Sentiment, SentimentHistory, Supply,
    },
    yahoo_client::YahooClient,
};
use std::sync::Arc;

/// Every provider client, constructed once and shared between cascades
struct Clients {
    kraken: Arc<KrakenClient>,
    binance: Arc<BinanceClient>,
    binance_futures: Arc<BinanceFuturesClient>,
    coingecko: Arc<CoingeckoClient>,
    blockchain: Arc<BlockchainClient>,
    alternative: Arc<AlternativeClient>,
    yahoo: Arc<YahooClient>,
}

impl Clients {
    fn new(fetcher: Arc<dyn JsonFetcher>, timeouts: ClientTimeouts) -> Self {
        Self {
            kraken: Arc::new(KrakenClient::new(fetcher.clone(), timeouts)),
            binance: Arc::new(BinanceClient::new(fetcher.clone(), timeouts)),
            binance_futures: Arc::new(BinanceFuturesClient::new(fetcher.clone(), timeouts)),
            coingecko: Arc::new(CoingeckoClient::new(fetcher.clone(), timeouts)),
            blockchain: Arc::new(BlockchainClient::new(fetcher.clone(), timeouts)),
            alternative: Arc::new(AlternativeClient::new(fetcher.clone(), timeouts)),
            yahoo: Arc::new(YahooClient::new(fetcher, timeouts)),
        }
    }

    fn price(&self, id: &str) -> Option<Arc<dyn Source<(), PriceQuote>>> {
        let source: Arc<dyn Source<(), PriceQuote>> = match id {
            KrakenClient::ID => self.kraken.clone(),
            BinanceClient::ID => self.binance.clone(),
            CoingeckoClient::ID => self.coingecko.clone(),
            BlockchainClient::ID => self.blockchain.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn history(&self, id: &str) -> Option<Arc<dyn Source<u32, HistoricalSeries>>> {
        let source: Arc<dyn Source<u32, HistoricalSeries>> = match id {
            KrakenClient::ID => self.kraken.clone(),
            BinanceClient::ID => self.binance.clone(),
            CoingeckoClient::ID => self.coingecko.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn sentiment(&self, id: &str) -> Option<Arc<dyn Source<(), Sentiment>>> {
        let source: Arc<dyn Source<(), Sentiment>> = match id {
            AlternativeClient::ID => self.alternative.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn sentiment_history(&self, id: &str) -> Option<Arc<dyn Source<u32, SentimentHistory>>> {
        let source: Arc<dyn Source<u32, SentimentHistory>> = match id {
            AlternativeClient::ID => self.alternative.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn supply(&self, id: &str) -> Option<Arc<dyn Source<(), Supply>>> {
        let source: Arc<dyn Source<(), Supply>> = match id {
            BlockchainClient::ID => self.blockchain.clone(),
            CoingeckoClient::ID => self.coingecko.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn dominance(&self, id: &str) -> Option<Arc<dyn Source<(), Dominance>>> {
        let source: Arc<dyn Source<(), Dominance>> = match id {
            CoingeckoClient::ID => self.coingecko.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn chain(&self, id: &str) -> Option<Arc<dyn Source<(), ChainMetrics>>> {
        let source: Arc<dyn Source<(), ChainMetrics>> = match id {
            BlockchainClient::ID => self.blockchain.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn derivatives(&self, id: &str) -> Option<Arc<dyn Source<(), Derivatives>>> {
        let source: Arc<dyn Source<(), Derivatives>> = match id {
            BinanceFuturesClient::ID => self.binance_futures.clone(),
            _ => return None,
        };
        Some(source)
    }

    fn index(&self, id: &str) -> Option<Arc<dyn Source<MarketIndex, HistoricalSeries>>> {
        let source: Arc<dyn Source<MarketIndex, HistoricalSeries>> = match id {
            YahooClient::ID => self.yahoo.clone(),
            _ => return None,
        };
        Some(source)
    }
}

/// Resolve configured provider ids into sources for one operation
///
/// # Errors
/// * `Config` - an id is unknown or cannot serve this operation
fn resolve<R, T, F>(operation: &str, ids: &[String], lookup: F) -> Result<Vec<Arc<dyn Source<R, T>>>>
where
    F: Fn(&str) -> Option<Arc<dyn Source<R, T>>>,
{
    if ids.is_empty() {
        return Err(SignalError::Config(format!("No providers configured for {}", operation)));
    }

    ids.iter()
        .map(|id| {
            lookup(id.as_str()).ok_or_else(|| {
                SignalError::Config(format!("Provider '{}' cannot serve {}", id, operation))
            })
        })
        .collect()
}

/// Cascading fetches for every data type the engine consumes
pub struct ProviderGateway {
    price: Cascade<(), PriceQuote>,
    history: Cascade<u32, HistoricalSeries>,
    sentiment: Cascade<(), Sentiment>,
    sentiment_history: Cascade<u32, SentimentHistory>,
    supply: Cascade<(), Supply>,
    dominance: Cascade<(), Dominance>,
    chain: Cascade<(), ChainMetrics>,
    derivatives: Cascade<(), Derivatives>,
    index: Cascade<MarketIndex, HistoricalSeries>,
    stats: Arc<ProviderStats>,
}

impl ProviderGateway {
    /// Build every cascade from the configured ordering
    ///
    /// # Arguments
    /// * `order` - Provider ids per operation, tried first to last
    /// * `timeouts` - Per-attempt budgets (history and index use their own)
    /// * `fetcher` - Upstream HTTP boundary shared by all clients
    ///
    /// # Errors
    /// * `Config` - unknown provider id, or a provider listed for an operation it does not support
    pub fn new(
        order: &ProviderOrder,
        timeouts: ClientTimeouts,
        fetcher: Arc<dyn JsonFetcher>,
    ) -> Result<Self> {
        let clients = Clients::new(fetcher, timeouts);
        let stats = Arc::new(ProviderStats::new());

        Ok(Self {
            price: Cascade::new(
                "price",
                resolve("price", &order.price, |id| clients.price(id))?,
                timeouts.request,
                stats.clone(),
            ),
            history: Cascade::new(
                "history",
                resolve("history", &order.history, |id| clients.history(id))?,
                timeouts.history,
                stats.clone(),
            ),
            sentiment: Cascade::new(
                "sentiment",
                resolve("sentiment", &order.sentiment, |id| clients.sentiment(id))?,
                timeouts.request,
                stats.clone(),
            ),
            sentiment_history: Cascade::new(
                "sentiment_history",
                resolve("sentiment history", &order.sentiment, |id| {
                    clients.sentiment_history(id)
                })?,
                timeouts.request,
                stats.clone(),
            ),
            supply: Cascade::new(
                "supply",
                resolve("supply", &order.supply, |id| clients.supply(id))?,
                timeouts.request,
                stats.clone(),
            ),
            dominance: Cascade::new(
                "dominance",
                resolve("dominance", &order.dominance, |id| clients.dominance(id))?,
                timeouts.request,
                stats.clone(),
            ),
            chain: Cascade::new(
                "chain_metrics",
                resolve("chain metrics", &order.chain, |id| clients.chain(id))?,
                timeouts.request,
                stats.clone(),
            ),
            derivatives: Cascade::new(
                "derivatives",
                resolve("derivatives", &order.derivatives, |id| clients.derivatives(id))?,
                timeouts.request,
                stats.clone(),
            ),
            index: Cascade::new(
                "index",
                resolve("index series", &order.index, |id| clients.index(id))?,
                timeouts.index,
                stats.clone(),
            ),
            stats,
        })
    }

    /// Current quote; all zeros when every provider failed
    pub async fn fetch_price(&self) -> PriceQuote {
        self.price
            .first_accepted_or(&(), PriceQuote::is_known, PriceQuote::default())
            .await
    }

    /// Daily closes with at least `min_len` points
    ///
    /// # Errors
    /// * `Exhausted` - no provider returned a long enough series
    pub async fn fetch_historical_series(&self, days: u32, min_len: usize) -> Result<HistoricalSeries> {
        let (series, _) = self
            .history
            .first_accepted(&days, |s: &HistoricalSeries| s.len() >= min_len)
            .await?;
        Ok(series)
    }

    /// Fear & Greed reading; 50 / "Neutral" on exhaustion
    pub async fn fetch_sentiment(&self) -> Sentiment {
        self.sentiment
            .first_accepted_or(&(), |s: &Sentiment| s.value <= 100, Sentiment::default())
            .await
    }

    /// Fear & Greed readings for the last `days` days; empty on exhaustion
    pub async fn fetch_sentiment_history(&self, days: u32) -> SentimentHistory {
        self.sentiment_history
            .first_accepted_or(&days, |h: &SentimentHistory| !h.is_empty(), SentimentHistory::new())
            .await
    }

    pub async fn fetch_supply(&self) -> Supply {
        self.supply
            .first_accepted_or(&(), |s: &Supply| s.circulating > 0.0, Supply::default())
            .await
    }

    pub async fn fetch_dominance(&self) -> Dominance {
        self.dominance
            .first_accepted_or(
                &(),
                |d: &Dominance| d.btc_dominance > 0.0 && d.btc_dominance <= 100.0,
                Dominance::default(),
            )
            .await
    }

    /// Hash rate and difficulty; each zero when unknown
    pub async fn fetch_chain_metrics(&self) -> ChainMetrics {
        self.chain
            .first_accepted_or(
                &(),
                |m: &ChainMetrics| m.hash_rate > 0.0 || m.difficulty > 0.0,
                ChainMetrics::default(),
            )
            .await
    }

    pub async fn fetch_derivatives(&self) -> Derivatives {
        self.derivatives
            .first_accepted_or(&(), |_| true, Derivatives::default())
            .await
    }

    /// One month of daily closes for a macro index; empty on exhaustion
    pub async fn fetch_index_series(&self, index: MarketIndex) -> HistoricalSeries {
        self.index
            .first_accepted_or(&index, |s: &HistoricalSeries| !s.is_empty(), HistoricalSeries::empty())
            .await
    }

    /// Attempt counters for every provider called so far
    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.stats.report()
    }

    /// Configured order of the price cascade
    pub fn price_providers(&self) -> Vec<&'static str> {
        self.price.source_ids()
    }
}

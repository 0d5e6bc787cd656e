use crate::scoring::WeightTable;
use anyhow::Context;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Cache lifetimes
    pub cache: CacheConfig,

    /// Upstream request budgets
    pub timeouts: ClientTimeouts,

    /// Provider ordering per data type
    pub providers: ProviderOrder,

    /// Holdings valued in every snapshot
    pub portfolio: PortfolioConfig,

    /// Composite score weights
    pub weights: WeightTable,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Snapshot served without refresh while younger than this
    pub snapshot_ttl: Duration,

    /// Historical range responses, per day-count
    pub history_ttl: Duration,

    /// Canonical 365-day series used by the indicators
    pub series_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(60),
            history_ttl: Duration::from_secs(3600),
            series_ttl: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    /// Spot quotes and small payloads
    pub request: Duration,

    /// Daily candle series
    pub history: Duration,

    /// Macro index charts
    pub index: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_millis(10_000),
            history: Duration::from_millis(15_000),
            index: Duration::from_millis(5_000),
        }
    }
}

/// Provider ids in the order they are tried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOrder {
    pub price: Vec<String>,
    pub history: Vec<String>,
    pub sentiment: Vec<String>,
    pub supply: Vec<String>,
    pub dominance: Vec<String>,
    pub chain: Vec<String>,
    pub derivatives: Vec<String>,
    pub index: Vec<String>,
}

impl Default for ProviderOrder {
    fn default() -> Self {
        Self {
            price: ids("kraken,binance,coingecko,blockchain_info"),
            history: ids("kraken,binance,coingecko"),
            sentiment: ids("alternative_me"),
            supply: ids("blockchain_info,coingecko"),
            dominance: ids("coingecko"),
            chain: ids("blockchain_info"),
            derivatives: ids("binance_futures"),
            index: ids("yahoo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    /// BTC held
    pub btc_amount: Decimal,

    /// Average purchase price in USD
    pub avg_price: Decimal,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            btc_amount: Decimal::from(982),
            avg_price: Decimal::from(65_188),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value lookup. Missing keys take defaults.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ProviderOrder::default();
        let port = get("PORT")
            .or_else(|| get("SERVER_PORT"))
            .unwrap_or_else(|| "5000".to_string());

        let weights = match get("INDICATOR_WEIGHTS") {
            Some(spec) => WeightTable::parse(&spec)?,
            None => WeightTable::default(),
        };
        weights.validate()?;

        Ok(Config {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: port
                .parse()
                .with_context(|| format!("Invalid port: {}", port))?,
            cache: CacheConfig {
                snapshot_ttl: Duration::from_secs(parse_or(&get, "SNAPSHOT_TTL_SECONDS", 60)?),
                history_ttl: Duration::from_secs(parse_or(&get, "HISTORY_TTL_SECONDS", 3600)?),
                series_ttl: Duration::from_secs(parse_or(&get, "SERIES_TTL_SECONDS", 1800)?),
            },
            timeouts: ClientTimeouts {
                request: Duration::from_millis(parse_or(&get, "REQUEST_TIMEOUT_MS", 10_000)?),
                history: Duration::from_millis(parse_or(&get, "HISTORY_TIMEOUT_MS", 15_000)?),
                index: Duration::from_millis(parse_or(&get, "INDEX_TIMEOUT_MS", 5_000)?),
            },
            providers: ProviderOrder {
                price: list_or(&get, "PRICE_PROVIDERS", defaults.price)?,
                history: list_or(&get, "HISTORY_PROVIDERS", defaults.history)?,
                sentiment: list_or(&get, "SENTIMENT_PROVIDERS", defaults.sentiment)?,
                supply: list_or(&get, "SUPPLY_PROVIDERS", defaults.supply)?,
                dominance: list_or(&get, "DOMINANCE_PROVIDERS", defaults.dominance)?,
                chain: list_or(&get, "CHAIN_PROVIDERS", defaults.chain)?,
                derivatives: list_or(&get, "DERIVATIVES_PROVIDERS", defaults.derivatives)?,
                index: list_or(&get, "INDEX_PROVIDERS", defaults.index)?,
            },
            portfolio: PortfolioConfig {
                btc_amount: parse_or(&get, "PORTFOLIO_BTC", Decimal::from(982))?,
                avg_price: parse_or(&get, "PORTFOLIO_AVG_PRICE", Decimal::from(65_188))?,
            },
            weights,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

fn list_or<F>(get: &F, key: &str, default: Vec<String>) -> anyhow::Result<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => {
            let list = ids(&raw);
            anyhow::ensure!(!list.is_empty(), "{} must name at least one provider", key);
            Ok(list)
        }
        None => Ok(default),
    }
}

fn ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

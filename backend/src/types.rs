use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::SignalError;

/// Maximum number of daily closes kept in a series
pub const MAX_SERIES_LEN: usize = 365;

/// Circulating BTC assumed when no supply provider answers
pub const CIRCULATING_ESTIMATE: u64 = 19_820_000;

/// Hard cap on BTC supply
pub const MAX_SUPPLY: u64 = 21_000_000;

/// Current spot quote for BTC/USD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Last traded price
    pub current: Decimal,

    /// 24h traded volume in USD
    pub volume_24h: Decimal,

    /// Market capitalisation in USD
    pub market_cap: Decimal,

    /// 24h change in percent
    #[serde(rename = "change_24h")]
    pub change_24h_pct: Decimal,
}

impl PriceQuote {
    /// A zero quote means every price provider failed
    pub fn is_known(&self) -> bool {
        self.current > Decimal::ZERO
    }

    /// Market cap for sources that only report a price
    pub fn estimated_market_cap(price: Decimal) -> Decimal {
        price * Decimal::from(CIRCULATING_ESTIMATE)
    }
}

/// One daily close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix timestamp (seconds) of the candle
    pub timestamp: i64,

    /// Closing price
    pub close: f64,
}

impl PricePoint {
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0).map(|dt| dt.date_naive())
    }
}

/// Daily closes ordered oldest to newest.
///
/// Construction always normalizes: points are sorted by timestamp, collapsed
/// to one point per UTC date (the latest one wins) and truncated to the newest
/// [`MAX_SERIES_LEN`] entries. Non-finite or non-positive closes are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    points: Vec<PricePoint>,
}

impl HistoricalSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.close.is_finite() && p.close > 0.0);
        points.sort_by_key(|p| p.timestamp);

        let mut normalized: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match normalized.last_mut() {
                Some(last) if last.date() == point.date() => *last = point,
                _ => normalized.push(point),
            }
        }

        if normalized.len() > MAX_SERIES_LEN {
            normalized.drain(..normalized.len() - MAX_SERIES_LEN);
        }

        Self { points: normalized }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Closing prices oldest to newest
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// The newest `days` points
    pub fn tail(&self, days: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(days);
        &self.points[start..]
    }
}

/// Fear & Greed index reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub value: u8,
    pub classification: String,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            value: 50,
            classification: "Neutral".to_string(),
        }
    }
}

/// Daily Fear & Greed readings keyed by UTC date
pub type SentimentHistory = HashMap<NaiveDate, u8>;

/// Coin supply figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Supply {
    pub circulating: f64,
    pub total: f64,
}

impl Default for Supply {
    fn default() -> Self {
        Self {
            circulating: CIRCULATING_ESTIMATE as f64,
            total: MAX_SUPPLY as f64,
        }
    }
}

/// Global crypto market figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dominance {
    /// BTC share of total crypto market cap, percent
    pub btc_dominance: f64,

    pub total_market_cap: f64,
}

impl Default for Dominance {
    fn default() -> Self {
        Self {
            btc_dominance: 56.0,
            total_market_cap: 0.0,
        }
    }
}

/// Network figures; zero means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainMetrics {
    /// Hash rate in GH/s as reported by the provider
    pub hash_rate: f64,

    pub difficulty: f64,
}

/// Perpetual futures positioning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    pub funding_rate_pct: f64,

    /// Open interest in BTC
    pub open_interest: f64,

    pub long_short_ratio: f64,
}

impl Default for Derivatives {
    fn default() -> Self {
        Self {
            funding_rate_pct: 0.0,
            open_interest: 0.0,
            long_short_ratio: 1.0,
        }
    }
}

/// External market index tracked for macro context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketIndex {
    /// US dollar index
    Dxy,
    Sp500,
}

impl MarketIndex {
    pub fn symbol(&self) -> &'static str {
        match self {
            MarketIndex::Dxy => "DX-Y.NYB",
            MarketIndex::Sp500 => "^GSPC",
        }
    }
}

/// Categorical recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl Signal {
    /// Contribution of this signal to the composite score
    pub fn band_score(&self) -> u32 {
        match self {
            Signal::StrongBuy => 100,
            Signal::Buy => 75,
            Signal::Neutral => 50,
            Signal::Sell => 25,
            Signal::StrongSell => 0,
        }
    }
}

/// Every indicator the engine computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorId {
    MvrvApprox,
    PuellMultiple,
    StockToFlow,
    DifficultyRibbon,
    HashRate,
    FearGreed,
    Rsi,
    #[serde(rename = "ma_200_position")]
    Ma200Position,
    Dxy,
    Sp500,
    HalvingCycle,
    BtcDominance,
    FundingRate,
    LongShortRatio,
    OpenInterest,
}

impl IndicatorId {
    pub const ALL: [IndicatorId; 15] = [
        IndicatorId::MvrvApprox,
        IndicatorId::PuellMultiple,
        IndicatorId::StockToFlow,
        IndicatorId::DifficultyRibbon,
        IndicatorId::HashRate,
        IndicatorId::FearGreed,
        IndicatorId::Rsi,
        IndicatorId::Ma200Position,
        IndicatorId::Dxy,
        IndicatorId::Sp500,
        IndicatorId::HalvingCycle,
        IndicatorId::BtcDominance,
        IndicatorId::FundingRate,
        IndicatorId::LongShortRatio,
        IndicatorId::OpenInterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorId::MvrvApprox => "mvrv_approx",
            IndicatorId::PuellMultiple => "puell_multiple",
            IndicatorId::StockToFlow => "stock_to_flow",
            IndicatorId::DifficultyRibbon => "difficulty_ribbon",
            IndicatorId::HashRate => "hash_rate",
            IndicatorId::FearGreed => "fear_greed",
            IndicatorId::Rsi => "rsi",
            IndicatorId::Ma200Position => "ma_200_position",
            IndicatorId::Dxy => "dxy",
            IndicatorId::Sp500 => "sp500",
            IndicatorId::HalvingCycle => "halving_cycle",
            IndicatorId::BtcDominance => "btc_dominance",
            IndicatorId::FundingRate => "funding_rate",
            IndicatorId::LongShortRatio => "long_short_ratio",
            IndicatorId::OpenInterest => "open_interest",
        }
    }
}

impl fmt::Display for IndicatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorId {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndicatorId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| SignalError::Config(format!("Unknown indicator id: {}", s)))
    }
}

/// One computed indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub value: f64,
    pub label: String,
    pub signal: Signal,

    /// 7-day change in percent (macro indices only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_change: Option<f64>,

    /// Difficulty ribbon compression flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<bool>,
}

impl Indicator {
    pub fn new(value: f64, label: impl Into<String>, signal: Signal) -> Self {
        Self {
            value,
            label: label.into(),
            signal,
            week_change: None,
            compression: None,
        }
    }
}

pub type IndicatorMap = BTreeMap<IndicatorId, Indicator>;

/// Weighted aggregate of all indicator signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composite {
    /// 0..=100
    pub score: u32,
    pub signal: Signal,
}

/// Valuation of the configured holdings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub btc_amount: Decimal,
    pub avg_price: Decimal,
    pub invested: Decimal,
    pub current_value: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_percent: Decimal,
}

/// Everything the dashboard shows, built once per refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub price: PriceQuote,
    pub portfolio: Portfolio,
    pub indicators: IndicatorMap,
    pub composite: Composite,
    pub updated_at: DateTime<Utc>,
}

/// One row of the historical range endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDay {
    /// YYYY-MM-DD
    pub date: NaiveDate,
    pub price: i64,
    pub buy_score: u8,
    pub fear_greed: u8,
    pub rsi: Option<f64>,
}

/// Attempt counters for one upstream provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub successes: u64,
    pub failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(day: i64, close: f64) -> PricePoint {
        PricePoint {
            timestamp: day * 86_400,
            close,
        }
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = HistoricalSeries::new(vec![
            point(3, 30.0),
            point(1, 10.0),
            PricePoint {
                timestamp: 86_400 + 3600,
                close: 11.0,
            },
            point(2, 20.0),
        ]);

        assert_eq!(series.closes(), vec![11.0, 20.0, 30.0]);
        assert!(series
            .points()
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_series_bounded_to_newest_365() {
        let points = (0..400).map(|d| point(d, d as f64 + 1.0)).collect();
        let series = HistoricalSeries::new(points);

        assert_eq!(series.len(), MAX_SERIES_LEN);
        assert_eq!(series.points()[0].close, 36.0);
        assert_eq!(series.tail(2).len(), 2);
        assert_eq!(series.tail(1000).len(), MAX_SERIES_LEN);
    }

    #[test]
    fn test_series_drops_invalid_closes() {
        let series = HistoricalSeries::new(vec![point(1, f64::NAN), point(2, 0.0), point(3, 5.0)]);
        assert_eq!(series.closes(), vec![5.0]);
    }

    #[test]
    fn test_indicator_id_names() {
        for id in IndicatorId::ALL {
            assert_eq!(id.as_str().parse::<IndicatorId>().unwrap(), id);
            assert_eq!(
                serde_json::to_value(id).unwrap(),
                serde_json::Value::String(id.as_str().to_string())
            );
        }
        assert!("bogus".parse::<IndicatorId>().is_err());
    }
}

//! Indicator Engine
//!
//! Pure computations over one refresh cycle's inputs. No I/O: everything the
//! engine needs is fetched beforehand and handed over in [`MarketInputs`], so
//! every indicator of a cycle sees the same quote and the same series.
//!
//! On-chain valuation metrics (MVRV, Puell) are approximated from the trailing
//! daily price series since no UTXO data is available.

use crate::math::{group_thousands, mean, round_to};
use crate::signals;
use crate::types::{
    ChainMetrics, Derivatives, Dominance, HistoricalSeries, Indicator, IndicatorId, IndicatorMap,
    Sentiment, Signal, Supply, CIRCULATING_ESTIMATE,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Minimum series length for the valuation metrics
const MIN_VALUATION_POINTS: usize = 30;

/// Minimum series length for RSI (15 closes, 14 deltas, plus one)
const MIN_RSI_POINTS: usize = 16;
const RSI_PERIOD: usize = 14;

const MA_WINDOW: usize = 200;

/// Post-2024 block subsidy times blocks per day
const DAILY_ISSUANCE_BTC: f64 = 3.125 * 144.0;

/// Blended annual issuance across the 2024 halving
const S2F_ANNUAL_FLOW: f64 = 328_500.0;
const S2F_SLOPE: f64 = 3.21;
const S2F_INTERCEPT: f64 = -1.23;

/// Difficulty (in trillions) above which the ribbon counts as compressed
const RIBBON_COMPRESSION_T: f64 = 80.0;

const WEEK_SECONDS: i64 = 7 * 86_400;

/// Everything one refresh cycle fetched
#[derive(Debug, Clone)]
pub struct MarketInputs<'a> {
    pub price: f64,
    pub series: &'a HistoricalSeries,
    pub supply: Supply,
    pub sentiment: &'a Sentiment,
    pub dominance: Dominance,
    pub chain: ChainMetrics,
    pub derivatives: Derivatives,
    pub dxy: &'a HistoricalSeries,
    pub sp500: &'a HistoricalSeries,
    pub now: DateTime<Utc>,
}

/// Compute every indicator for one cycle
pub fn compute_all(inputs: &MarketInputs) -> IndicatorMap {
    let price = inputs.price;
    let closes = inputs.series.closes();

    let mut indicators = IndicatorMap::new();

    let (mvrv_value, realized) = mvrv(price, &closes);
    indicators.insert(
        IndicatorId::MvrvApprox,
        Indicator::new(
            mvrv_value,
            format!("MVRV≈{}x | Realized≈${}", mvrv_value, group_thousands(realized.round() as i64)),
            signals::mvrv(mvrv_value),
        ),
    );

    let puell_value = puell_multiple(price, &closes);
    indicators.insert(
        IndicatorId::PuellMultiple,
        Indicator::new(puell_value, format!("{}x", puell_value), signals::puell(puell_value)),
    );

    let s2f = stock_to_flow(inputs.supply.circulating);
    let deviation = s2f.deviation_pct(price);
    indicators.insert(
        IndicatorId::StockToFlow,
        Indicator::new(
            s2f.ratio,
            format!("S2F: {} | Model: ${}", s2f.ratio, group_thousands(s2f.model_price as i64)),
            signals::stock_to_flow(deviation),
        ),
    );

    let (diff_t, compression) = difficulty_ribbon(inputs.chain.difficulty);
    let mut ribbon = Indicator::new(
        diff_t,
        format!("{}T {}", diff_t, if compression { "compression" } else { "expansion" }),
        signals::difficulty_ribbon(compression),
    );
    ribbon.compression = Some(compression);
    indicators.insert(IndicatorId::DifficultyRibbon, ribbon);

    let eh = hash_rate_ehs(inputs.chain.hash_rate);
    indicators.insert(
        IndicatorId::HashRate,
        Indicator::new(eh, format!("{} EH/s", eh), Signal::Neutral),
    );

    let fg = f64::from(inputs.sentiment.value);
    indicators.insert(
        IndicatorId::FearGreed,
        Indicator::new(
            fg,
            format!("{} - {}", inputs.sentiment.value, inputs.sentiment.classification),
            signals::fear_greed(fg),
        ),
    );

    let rsi_value = rsi(&closes);
    indicators.insert(
        IndicatorId::Rsi,
        Indicator::new(rsi_value, rsi_value.to_string(), signals::rsi(rsi_value)),
    );

    let (position, _) = ma_200_position(price, &closes);
    indicators.insert(
        IndicatorId::Ma200Position,
        Indicator::new(position, signed_pct(position, 1), signals::ma_200_position(position)),
    );

    indicators.insert(IndicatorId::Dxy, dxy_indicator(inputs.dxy));
    indicators.insert(IndicatorId::Sp500, sp500_indicator(inputs.sp500));

    let halving = halving_cycle(inputs.now);
    indicators.insert(
        IndicatorId::HalvingCycle,
        Indicator::new(
            halving.percent,
            format!("{}% ({}d to halving)", halving.percent, halving.days_remaining),
            signals::halving_cycle(halving.percent),
        ),
    );

    let dominance = round_to(inputs.dominance.btc_dominance, 1);
    indicators.insert(
        IndicatorId::BtcDominance,
        Indicator::new(dominance, format!("{}%", dominance), signals::btc_dominance(dominance)),
    );

    let funding = inputs.derivatives.funding_rate_pct;
    indicators.insert(
        IndicatorId::FundingRate,
        Indicator::new(round_to(funding, 3), format!("{:.3}%", funding), signals::funding_rate(funding)),
    );

    let ratio = inputs.derivatives.long_short_ratio;
    indicators.insert(
        IndicatorId::LongShortRatio,
        Indicator::new(round_to(ratio, 2), format!("{:.2}", ratio), signals::long_short_ratio(ratio)),
    );

    let oi_billions = open_interest_billions(inputs.derivatives.open_interest, price);
    indicators.insert(
        IndicatorId::OpenInterest,
        Indicator::new(oi_billions, format!("${:.1}B", oi_billions), Signal::Neutral),
    );

    indicators
}

/// MVRV approximation: price over the trailing average price.
///
/// Returns `(mvrv, realized_price)`. With fewer than 30 closes the ratio is
/// 1.0 and the realized price is the current price.
pub fn mvrv(price: f64, closes: &[f64]) -> (f64, f64) {
    if closes.len() < MIN_VALUATION_POINTS {
        return (1.0, price);
    }

    let realized = mean(closes).round();
    if realized <= 0.0 {
        return (1.0, price);
    }

    (round_to(price / realized, 2), realized)
}

/// Today's estimated miner revenue over the trailing average daily revenue
pub fn puell_multiple(price: f64, closes: &[f64]) -> f64 {
    if closes.len() < MIN_VALUATION_POINTS {
        return 1.0;
    }

    let daily_revenue = DAILY_ISSUANCE_BTC * price;
    let avg_daily_revenue = DAILY_ISSUANCE_BTC * mean(closes);
    if avg_daily_revenue <= 0.0 {
        return 1.0;
    }

    round_to(daily_revenue / avg_daily_revenue, 2)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockToFlow {
    pub ratio: f64,
    pub model_price: f64,
}

impl StockToFlow {
    /// How far `price` sits above (+) or below (−) the model, in percent
    pub fn deviation_pct(&self, price: f64) -> f64 {
        if self.model_price > 0.0 {
            (price / self.model_price - 1.0) * 100.0
        } else {
            0.0
        }
    }
}

/// Stock-to-flow ratio and the log-linear model price it implies
pub fn stock_to_flow(circulating: f64) -> StockToFlow {
    let circulating = if circulating > 0.0 {
        circulating
    } else {
        CIRCULATING_ESTIMATE as f64
    };

    let ratio = round_to(circulating / S2F_ANNUAL_FLOW, 1);
    let model_price = (S2F_SLOPE * ratio.ln() + S2F_INTERCEPT).exp().round();

    StockToFlow { ratio, model_price }
}

/// Difficulty in trillions and whether the ribbon is compressed
pub fn difficulty_ribbon(difficulty: f64) -> (f64, bool) {
    let diff_t = if difficulty > 0.0 {
        round_to(difficulty / 1e12, 2)
    } else {
        0.0
    };
    (diff_t, diff_t > RIBBON_COMPRESSION_T)
}

/// Provider hash rate (GH/s, or TH/s on older feeds) to EH/s
pub fn hash_rate_ehs(hash_rate: f64) -> f64 {
    if hash_rate > 1e9 {
        (hash_rate / 1e9).round()
    } else {
        (hash_rate / 1e6).round()
    }
}

/// RSI(14) over the last 15 closes using simple averages.
///
/// 50 with fewer than 16 closes; 100 when there were no losses.
pub fn rsi(closes: &[f64]) -> f64 {
    if closes.len() < MIN_RSI_POINTS {
        return 50.0;
    }

    let recent = &closes[closes.len() - (RSI_PERIOD + 1)..];
    let (gains, losses) = recent.windows(2).fold((0.0, 0.0), |(gains, losses), w| {
        let change = w[1] - w[0];
        if change > 0.0 {
            (gains + change, losses)
        } else {
            (gains, losses - change)
        }
    });

    let avg_gain = gains / RSI_PERIOD as f64;
    let avg_loss = losses / RSI_PERIOD as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    round_to(100.0 - 100.0 / (1.0 + rs), 1)
}

/// Price position relative to the 200-day moving average.
///
/// Returns `(position_pct, ma)`. With fewer than 200 closes the average of
/// all closes is used; with fewer than 30 the position is 0 and the average
/// is the price itself.
pub fn ma_200_position(price: f64, closes: &[f64]) -> (f64, f64) {
    if closes.len() < MIN_VALUATION_POINTS {
        return (0.0, price);
    }

    let ma = if closes.len() >= MA_WINDOW {
        mean(&closes[closes.len() - MA_WINDOW..]).round()
    } else {
        mean(closes)
    };

    if ma <= 0.0 {
        return (0.0, price);
    }

    (round_to((price / ma - 1.0) * 100.0, 1), ma)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalvingProgress {
    /// Percent of the current epoch elapsed
    pub percent: f64,
    pub days_remaining: f64,
}

fn halving_date(year: i32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(year, 4, 20).unwrap_or_default();
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Progress through the 2024-04-20 → 2028-04-20 halving epoch
pub fn halving_cycle(now: DateTime<Utc>) -> HalvingProgress {
    let last = halving_date(2024);
    let next = halving_date(2028);

    let day = 86_400.0;
    let total_days = (next - last).num_seconds() as f64 / day;
    let elapsed_days = (now - last).num_seconds() as f64 / day;
    let remaining_days = (next - now).num_seconds() as f64 / day;

    HalvingProgress {
        percent: (elapsed_days / total_days * 100.0).round(),
        days_remaining: remaining_days.round(),
    }
}

/// Open interest in billions of USD
pub fn open_interest_billions(open_interest: f64, price: f64) -> f64 {
    if open_interest <= 0.0 {
        return 0.0;
    }
    round_to(open_interest * price / 1e9, 1)
}

/// Latest close and its change over roughly one week, in percent.
///
/// The reference is the last point at or before seven days prior to the
/// latest point, or the first point when the series is shorter than that.
/// `None` with fewer than two points.
pub fn week_change(series: &HistoricalSeries) -> Option<(f64, f64)> {
    let points = series.points();
    if points.len() < 2 {
        return None;
    }

    let latest = points[points.len() - 1];
    let cutoff = latest.timestamp - WEEK_SECONDS;
    let reference = points
        .iter()
        .take_while(|p| p.timestamp <= cutoff)
        .last()
        .unwrap_or(&points[0]);

    Some((latest.close, (latest.close / reference.close - 1.0) * 100.0))
}

fn unavailable() -> Indicator {
    let mut indicator = Indicator::new(0.0, "N/A", Signal::Neutral);
    indicator.week_change = Some(0.0);
    indicator
}

fn dxy_indicator(series: &HistoricalSeries) -> Indicator {
    let Some((current, change)) = week_change(series) else {
        return unavailable();
    };

    let mut indicator = Indicator::new(
        round_to(current, 2),
        format!("{:.2} ({} 7d)", current, signed_pct(change, 2)),
        signals::dxy(change),
    );
    indicator.week_change = Some(round_to(change, 2));
    indicator
}

fn sp500_indicator(series: &HistoricalSeries) -> Indicator {
    let Some((current, change)) = week_change(series) else {
        return unavailable();
    };

    let mut indicator = Indicator::new(
        current.round(),
        format!("{} ({} 7d)", current.round(), signed_pct(change, 2)),
        signals::sp500(change),
    );
    indicator.week_change = Some(round_to(change, 2));
    indicator
}

/// `+1.25%` / `-0.40%` / `0.00%`
fn signed_pct(value: f64, places: usize) -> String {
    let sign = if value > 0.0 { "+" } else { "" };
    format!("{}{:.*}%", sign, places, value)
}

//! Signal ladders mapping indicator values to [`Signal`]s.
//!
//! Five-band ladders list four ascending breakpoints; a value strictly below
//! the first is `strong_buy`, below the second `buy` and so on, with anything
//! at or above the last breakpoint `strong_sell`.

use crate::types::Signal;

const MVRV_BANDS: [f64; 4] = [0.8, 1.0, 2.5, 3.5];
const PUELL_BANDS: [f64; 4] = [0.5, 0.65, 1.5, 4.0];
const S2F_DEVIATION_BANDS: [f64; 4] = [-50.0, -20.0, 50.0, 100.0];
const FEAR_GREED_BANDS: [f64; 4] = [15.0, 30.0, 60.0, 80.0];
const RSI_BANDS: [f64; 4] = [25.0, 40.0, 60.0, 75.0];
const MA200_BANDS: [f64; 4] = [-25.0, -10.0, 30.0, 60.0];
const DXY_BANDS: [f64; 4] = [-2.0, -0.5, 0.5, 2.0];
const HALVING_BANDS: [f64; 4] = [25.0, 50.0, 70.0, 85.0];
const FUNDING_BANDS: [f64; 4] = [-0.05, -0.01, 0.05, 0.1];

fn five_band(value: f64, bands: [f64; 4]) -> Signal {
    if value < bands[0] {
        Signal::StrongBuy
    } else if value < bands[1] {
        Signal::Buy
    } else if value < bands[2] {
        Signal::Neutral
    } else if value < bands[3] {
        Signal::Sell
    } else {
        Signal::StrongSell
    }
}

pub fn mvrv(value: f64) -> Signal {
    five_band(value, MVRV_BANDS)
}

pub fn puell(value: f64) -> Signal {
    five_band(value, PUELL_BANDS)
}

/// On the deviation from the model price, in percent
pub fn stock_to_flow(deviation_pct: f64) -> Signal {
    five_band(deviation_pct, S2F_DEVIATION_BANDS)
}

pub fn fear_greed(value: f64) -> Signal {
    five_band(value, FEAR_GREED_BANDS)
}

pub fn rsi(value: f64) -> Signal {
    five_band(value, RSI_BANDS)
}

pub fn ma_200_position(position_pct: f64) -> Signal {
    five_band(position_pct, MA200_BANDS)
}

/// On the 7-day change; a weakening dollar is bullish
pub fn dxy(week_change_pct: f64) -> Signal {
    five_band(week_change_pct, DXY_BANDS)
}

pub fn halving_cycle(percent: f64) -> Signal {
    five_band(percent, HALVING_BANDS)
}

pub fn funding_rate(rate_pct: f64) -> Signal {
    five_band(rate_pct, FUNDING_BANDS)
}

pub fn btc_dominance(dominance_pct: f64) -> Signal {
    if dominance_pct > 55.0 {
        Signal::Buy
    } else if dominance_pct > 45.0 {
        Signal::Neutral
    } else {
        Signal::Sell
    }
}

pub fn long_short_ratio(ratio: f64) -> Signal {
    if ratio < 0.8 {
        Signal::Buy
    } else if ratio < 1.3 {
        Signal::Neutral
    } else {
        Signal::Sell
    }
}

pub fn difficulty_ribbon(compression: bool) -> Signal {
    if compression {
        Signal::StrongBuy
    } else {
        Signal::Neutral
    }
}

/// On the 7-day change
pub fn sp500(week_change_pct: f64) -> Signal {
    if week_change_pct > 1.0 {
        Signal::Buy
    } else if week_change_pct < -2.0 {
        Signal::Sell
    } else {
        Signal::Neutral
    }
}

/// Composite score bands (inclusive lower bounds)
pub fn composite(score: u32) -> Signal {
    match score {
        80.. => Signal::StrongBuy,
        65..=79 => Signal::Buy,
        35..=64 => Signal::Neutral,
        20..=34 => Signal::Sell,
        _ => Signal::StrongSell,
    }
}

//! Technical indicator library
//!
//! Pure functions over price/volume slices. Every output is aligned with its
//! input and has the same length; positions whose lookback window is not yet
//! complete hold `NaN`. Division by zero is deliberately left to IEEE
//! arithmetic so that the feature engineer's row filter decides what survives.

pub mod rolling;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

pub use rolling::{
    cumsum_skip_nan, diff, pct_change, rolling_max, rolling_mean, rolling_min, rolling_std,
    shift,
};

/// Indicator families the feature engineer can enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    BollingerBands,
    Stochastic,
    WilliamsR,
    Cci,
    Adx,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 9] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::BollingerBands,
        IndicatorKind::Stochastic,
        IndicatorKind::WilliamsR,
        IndicatorKind::Cci,
        IndicatorKind::Adx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::BollingerBands => "bollinger_bands",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::WilliamsR => "williams_r",
            IndicatorKind::Cci => "cci",
            IndicatorKind::Adx => "adx",
        }
    }
}

/// Simple Moving Average
pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    rolling_mean(prices, period)
}

/// Exponential Moving Average with span `period`.
///
/// Bias-adjusted form: each output is the decay-weighted mean of all values
/// seen so far, so the series is defined from the first finite input.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;

    prices
        .iter()
        .map(|&p| {
            num *= decay;
            den *= decay;
            if !p.is_nan() {
                num += p;
                den += 1.0;
            }
            if den > 0.0 {
                num / den
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Ratio of price to a moving average
pub fn price_ratio(prices: &[f64], average: &[f64]) -> Vec<f64> {
    prices.iter().zip(average).map(|(p, m)| p / m).collect()
}

/// Relative Strength Index.
///
/// Average gain over average loss across `period` price changes. The first
/// `period` values are `NaN`. A zero average loss is not special-cased.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let delta = diff(prices, 1);
    let gains: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { f64::NAN } else { d.max(0.0) })
        .collect();
    let losses: Vec<f64> = delta
        .iter()
        .map(|&d| if d.is_nan() { f64::NAN } else { (-d).max(0.0) })
        .collect();

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            let rs = g / l;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}

/// Moving Average Convergence Divergence
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();

    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

/// Bollinger Bands with normalized width and price position
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
    pub width: Vec<f64>,
    pub position: Vec<f64>,
}

pub fn bollinger_bands(prices: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let middle = rolling_mean(prices, period);
    let std = rolling_std(prices, period);

    let upper: Vec<f64> = middle.iter().zip(&std).map(|(m, s)| m + s * num_std).collect();
    let lower: Vec<f64> = middle.iter().zip(&std).map(|(m, s)| m - s * num_std).collect();
    let width = (0..prices.len())
        .map(|i| (upper[i] - lower[i]) / middle[i])
        .collect();
    let position = (0..prices.len())
        .map(|i| (prices[i] - lower[i]) / (upper[i] - lower[i]))
        .collect();

    BollingerBands {
        upper,
        middle,
        lower,
        width,
        position,
    }
}

/// Stochastic oscillator (%K and its %D smoothing)
#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> Stochastic {
    let lowest = rolling_min(low, k_period);
    let highest = rolling_max(high, k_period);
    let k: Vec<f64> = (0..close.len())
        .map(|i| 100.0 * (close[i] - lowest[i]) / (highest[i] - lowest[i]))
        .collect();
    let d = rolling_mean(&k, d_period);

    Stochastic { k, d }
}

/// Williams %R, in [-100, 0]
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let highest = rolling_max(high, period);
    let lowest = rolling_min(low, period);
    (0..close.len())
        .map(|i| -100.0 * (highest[i] - close[i]) / (highest[i] - lowest[i]))
        .collect()
}

/// Commodity Channel Index
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    const SCALE: f64 = 0.015;

    let typical: Vec<f64> = (0..close.len())
        .map(|i| (high[i] + low[i] + close[i]) / 3.0)
        .collect();
    let mean = rolling_mean(&typical, period);
    let mad = rolling::rolling_apply(&typical, period, |window| {
        let m = window.iter().sum::<f64>() / window.len() as f64;
        window.iter().map(|x| (x - m).abs()).sum::<f64>() / window.len() as f64
    });

    (0..close.len())
        .map(|i| (typical[i] - mean[i]) / (SCALE * mad[i]))
        .collect()
}

/// True range; the first bar has no previous close and is `NaN`
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            if i == 0 {
                return f64::NAN;
            }
            let prev = close[i - 1];
            (high[i] - low[i])
                .max((high[i] - prev).abs())
                .max((low[i] - prev).abs())
        })
        .collect()
}

/// Simplified trend-strength proxy: rolling mean of true range.
///
/// Not Wilder's ADX (no directional-movement smoothing); the feature column
/// is named `adx_approx` for that reason.
pub fn adx_approx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    rolling_mean(&true_range(high, low, close), period)
}

/// On-Balance Volume, seeded with the first bar's volume
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(close.len());
    for i in 0..close.len() {
        let value = if i == 0 {
            volume[0]
        } else if close[i] > close[i - 1] {
            result[i - 1] + volume[i]
        } else if close[i] < close[i - 1] {
            result[i - 1] - volume[i]
        } else {
            result[i - 1]
        };
        result.push(value);
    }
    result
}

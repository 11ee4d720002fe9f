//! Pure technical indicators over a candle history slice.
//!
//! Every function is stateless: it recomputes from the slice it is given and
//! keeps no memory between calls. Insufficient history never fails — each
//! indicator falls back to a documented neutral default instead.

use crate::candles::Candle;
use serde::{Deserialize, Serialize};

/// Moving-average trend classification over short vs long mean close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Uptrend,
    Downtrend,
    Neutral,
}

/// MACD line, signal line and histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Relative Strength Index over the last `period` closes, Wilder-style
/// simple average of gains and losses (not smoothed across calls).
///
/// Returns 50.0 when fewer than `period + 1` candles are available and
/// 100.0 when the average loss is exactly zero.
pub fn rsi(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 50.0;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in candles.len() - period..candles.len() {
        let change = candles[i].close - candles[i - 1].close;
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Exponential moving average of closes, seeded with the close `period` bars
/// back and folded forward with multiplier `2 / (period + 1)`.
///
/// Returns the latest close verbatim when the history is shorter than
/// `period`, and 0.0 on an empty slice.
pub fn ema(candles: &[Candle], period: usize) -> f64 {
    let Some(last) = candles.last() else {
        return 0.0;
    };
    if candles.len() < period {
        return last.close;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut value = candles[candles.len() - period].close;
    for candle in &candles[candles.len() - period + 1..] {
        value = (candle.close - value) * multiplier + value;
    }
    value
}

/// MACD with the classic 12/26/9 structure (periods are caller-supplied).
///
/// The signal line is an EMA folded over up to `signal_period` trailing
/// MACD-line values, each recomputed on a truncated history prefix. This is
/// quadratic in the reconstruction window but bounded by the 100-candle
/// history cap. When the history is too short to reconstruct any trailing
/// value, the signal line falls back to the MACD line itself so the
/// histogram is a defined 0.0 rather than NaN.
pub fn macd(candles: &[Candle], fast_period: usize, slow_period: usize, signal_period: usize) -> Macd {
    let line = ema(candles, fast_period) - ema(candles, slow_period);

    let mut trailing = Vec::with_capacity(signal_period);
    for i in 0..signal_period {
        if candles.len() >= slow_period + i {
            let prefix = &candles[..candles.len() - i];
            trailing.push(ema(prefix, fast_period) - ema(prefix, slow_period));
        }
    }

    let signal = match trailing.first() {
        None => line,
        Some(&seed) => {
            let multiplier = 2.0 / (signal_period as f64 + 1.0);
            trailing[1..]
                .iter()
                .fold(seed, |acc, &value| (value - acc) * multiplier + acc)
        }
    };

    Macd {
        line,
        signal,
        histogram: line - signal,
    }
}

/// Stochastic %K: position of the latest close within the high/low range of
/// the last `k_period` candles, scaled to [0, 100].
///
/// Returns 50.0 when fewer than `k_period + d_period` candles are available,
/// and 50.0 on a flat range (zero denominator) so NaN never reaches the
/// vote table.
pub fn stochastic_k(candles: &[Candle], k_period: usize, d_period: usize) -> f64 {
    if candles.len() < k_period + d_period {
        return 50.0;
    }

    let window = &candles[candles.len() - k_period..];
    let lowest_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let highest_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);

    let range = highest_high - lowest_low;
    if range == 0.0 {
        return 50.0;
    }

    let close = candles[candles.len() - 1].close;
    (close - lowest_low) / range * 100.0
}

/// Trend from mean close of the last 5 candles vs the last 20, with a 0.5%
/// dead band. Neutral when fewer than 10 candles are available.
pub fn classify_trend(candles: &[Candle]) -> Trend {
    if candles.len() < 10 {
        return Trend::Neutral;
    }

    let short_avg = mean_close(&candles[candles.len().saturating_sub(5)..]);
    let long_avg = mean_close(&candles[candles.len().saturating_sub(20)..]);

    if short_avg > long_avg * 1.005 {
        Trend::Uptrend
    } else if short_avg < long_avg * 0.995 {
        Trend::Downtrend
    } else {
        Trend::Neutral
    }
}

/// Mean absolute relative close-to-close change over the whole history.
/// Used by confidence scoring as a crude volatility gauge. 0.0 with fewer
/// than two candles.
pub fn mean_abs_change(candles: &[Candle]) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }

    let sum: f64 = candles
        .windows(2)
        .map(|w| ((w[1].close - w[0].close) / w[0].close).abs())
        .sum();
    sum / (candles.len() - 1) as f64
}

fn mean_close(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.close).sum::<f64>() / candles.len() as f64
}

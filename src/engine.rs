use crate::candles::Candle;
use crate::config::IndicatorConfig;
use crate::indicators::{self, Macd, Trend};
use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

/// Minimum candle count before indicator-driven decisions are meaningful.
pub const MIN_HISTORY: usize = 20;

/// Mean-absolute-change threshold above which the volatility confidence
/// bonus is awarded.
const VOLATILITY_BONUS_THRESHOLD: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

/// Distinguishes indicator-driven signals from the fabricated fallback the
/// scheduler emits when there is not enough history to analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOrigin {
    Indicator,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Heuristic agreement score: 0.0 for neutral, otherwise in [0.60, 0.95].
    pub confidence: f64,
    pub origin: SignalOrigin,
}

/// All indicator values for one decision, recomputed from the history on
/// every invocation. Never cached between calls.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub macd: Macd,
    pub stochastic_k: f64,
    pub trend: Trend,
    pub volatility: f64,
}

impl IndicatorSnapshot {
    pub fn compute(candles: &[Candle], config: &IndicatorConfig) -> Self {
        Self {
            rsi: indicators::rsi(candles, config.rsi_period),
            ema_short: indicators::ema(candles, config.ema_short_period),
            ema_long: indicators::ema(candles, config.ema_long_period),
            macd: indicators::macd(
                candles,
                config.macd_fast_period,
                config.macd_slow_period,
                config.macd_signal_period,
            ),
            stochastic_k: indicators::stochastic_k(
                candles,
                config.stochastic_k_period,
                config.stochastic_d_period,
            ),
            trend: indicators::classify_trend(candles),
            volatility: indicators::mean_abs_change(candles),
        }
    }

    /// The five per-indicator votes, in RSI/EMA/MACD/Stochastic/Trend order.
    /// EMA and MACD never vote neutral.
    pub fn votes(&self) -> [Direction; 5] {
        let rsi = if self.rsi > 70.0 {
            Direction::Sell
        } else if self.rsi < 30.0 {
            Direction::Buy
        } else {
            Direction::Neutral
        };
        let ema = if self.ema_short > self.ema_long {
            Direction::Buy
        } else {
            Direction::Sell
        };
        let macd = if self.macd.histogram > 0.0 {
            Direction::Buy
        } else {
            Direction::Sell
        };
        let stochastic = if self.stochastic_k > 80.0 {
            Direction::Sell
        } else if self.stochastic_k < 20.0 {
            Direction::Buy
        } else {
            Direction::Neutral
        };
        let trend = match self.trend {
            Trend::Uptrend => Direction::Buy,
            Trend::Downtrend => Direction::Sell,
            Trend::Neutral => Direction::Neutral,
        };
        [rsi, ema, macd, stochastic, trend]
    }
}

/// Majority-vote signal decision over a candle history.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    indicators: IndicatorConfig,
}

impl SignalEngine {
    pub fn new(indicators: IndicatorConfig) -> Self {
        Self { indicators }
    }

    /// Decide a direction and confidence from the current history. Pure:
    /// identical history and sensitivity always yield an identical signal.
    ///
    /// Errors if fewer than [`MIN_HISTORY`] candles are available; callers
    /// are expected to guard and fall back instead of invoking this.
    pub fn decide(&self, candles: &[Candle], sensitivity: i64) -> Result<Signal> {
        if candles.len() < MIN_HISTORY {
            return Err(anyhow!(
                "Insufficient history for signal decision: {} candles, need {}",
                candles.len(),
                MIN_HISTORY
            ));
        }

        let snapshot = IndicatorSnapshot::compute(candles, &self.indicators);
        let votes = snapshot.votes();

        let buy_votes = votes.iter().filter(|v| **v == Direction::Buy).count();
        let sell_votes = votes.iter().filter(|v| **v == Direction::Sell).count();
        let threshold = sensitivity as f64 / 2.0;

        let direction = if buy_votes as f64 >= threshold {
            Direction::Buy
        } else if sell_votes as f64 >= threshold {
            Direction::Sell
        } else {
            // No clear majority: fall back to the trend's own direction.
            match snapshot.trend {
                Trend::Uptrend => Direction::Buy,
                Trend::Downtrend => Direction::Sell,
                Trend::Neutral => Direction::Neutral,
            }
        };

        let confidence = confidence_score(direction, &snapshot);

        debug!(
            "Decision: {:?} conf={:.2} (buy={}, sell={}, rsi={:.1}, stoch={:.1}, trend={:?})",
            direction, confidence, buy_votes, sell_votes, snapshot.rsi, snapshot.stochastic_k, snapshot.trend
        );

        Ok(Signal {
            direction,
            confidence,
            origin: SignalOrigin::Indicator,
        })
    }
}

/// Weighted agreement across six factors: the five indicators (trend weighted
/// heaviest) plus a volatility bonus. The achieved share of total weight is
/// clamped to [0.60, 0.95]; a neutral direction always scores 0.0.
fn confidence_score(direction: Direction, snapshot: &IndicatorSnapshot) -> f64 {
    if direction == Direction::Neutral {
        return 0.0;
    }
    let buying = direction == Direction::Buy;

    let mut achieved: f64 = 0.0;
    let mut total: f64 = 0.0;

    // RSI leaning the right way, on a looser band than its vote thresholds.
    if (buying && snapshot.rsi < 40.0) || (!buying && snapshot.rsi > 60.0) {
        achieved += 0.15;
    }
    total += 0.15;

    if (buying && snapshot.ema_short > snapshot.ema_long)
        || (!buying && snapshot.ema_short < snapshot.ema_long)
    {
        achieved += 0.15;
    }
    total += 0.15;

    if (buying && snapshot.macd.histogram > 0.0) || (!buying && snapshot.macd.histogram < 0.0) {
        achieved += 0.15;
    }
    total += 0.15;

    if (buying && snapshot.stochastic_k < 40.0) || (!buying && snapshot.stochastic_k > 60.0) {
        achieved += 0.15;
    }
    total += 0.15;

    if (buying && snapshot.trend == Trend::Uptrend)
        || (!buying && snapshot.trend == Trend::Downtrend)
    {
        achieved += 0.20;
    }
    total += 0.20;

    if snapshot.volatility > VOLATILITY_BONUS_THRESHOLD {
        achieved += 0.10;
    }
    total += 0.10;

    (achieved / total).clamp(0.60, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                interval_start: i as i64,
            })
            .collect()
    }

    fn engine() -> SignalEngine {
        SignalEngine::new(IndicatorConfig::default())
    }

    #[test]
    fn test_decide_rejects_short_history() {
        let candles = candles_from_closes(&[100.0; 19]);
        assert!(engine().decide(&candles, 6).is_err());
    }

    #[test]
    fn test_steady_uptrend_is_a_buy() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let candles = candles_from_closes(&closes);

        let signal = engine().decide(&candles, 6).unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert!(signal.confidence >= 0.60);
        assert_eq!(signal.origin, SignalOrigin::Indicator);
    }

    #[test]
    fn test_steady_downtrend_is_a_sell() {
        let closes: Vec<f64> = (0..25).map(|i| 200.0 - i as f64).collect();
        let candles = candles_from_closes(&closes);

        let signal = engine().decide(&candles, 6).unwrap();
        assert_eq!(signal.direction, Direction::Sell);
        assert!(signal.confidence >= 0.60);
    }

    #[test]
    fn test_flat_market_is_neutral_with_zero_confidence() {
        let candles = candles_from_closes(&[100.0; 25]);

        // EMA and MACD always vote (sell on exact ties), so force a high
        // sensitivity to keep the tally below threshold.
        let signal = engine().decide(&candles, 10).unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_confidence_stays_in_band() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0)
            .collect();
        let candles = candles_from_closes(&closes);

        for sensitivity in 1..=10 {
            let signal = engine().decide(&candles, sensitivity).unwrap();
            if signal.direction == Direction::Neutral {
                assert_eq!(signal.confidence, 0.0);
            } else {
                assert!((0.60..=0.95).contains(&signal.confidence));
            }
        }
    }

    #[test]
    fn test_decide_is_idempotent() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 7) as f64).collect();
        let candles = candles_from_closes(&closes);

        let first = engine().decide(&candles, 6).unwrap();
        let second = engine().decide(&candles, 6).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_low_sensitivity_triggers_on_single_vote() {
        // sensitivity=1 means half a vote: any single buy or sell vote wins.
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64 * 0.001).collect();
        let candles = candles_from_closes(&closes);

        let signal = engine().decide(&candles, 1).unwrap();
        assert_ne!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn test_votes_layout() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let candles = candles_from_closes(&closes);
        let snapshot = IndicatorSnapshot::compute(&candles, &IndicatorConfig::default());
        let votes = snapshot.votes();

        // Strict uptrend: RSI pegged at 100 votes sell, EMA/MACD/trend buy,
        // stochastic near the top votes sell.
        assert_eq!(votes[0], Direction::Sell);
        assert_eq!(votes[1], Direction::Buy);
        assert_eq!(votes[2], Direction::Buy);
        assert_eq!(votes[4], Direction::Buy);
    }
}

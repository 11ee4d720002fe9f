use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub settings: SignalSettings,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// User-tunable signal behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    /// Signals below this confidence are computed but not surfaced.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Vote threshold divisor: a direction wins when its vote count reaches
    /// `strategy_sensitivity / 2` (fractional halves count, so 5 means an
    /// effective 3 votes).
    #[serde(default = "default_strategy_sensitivity")]
    pub strategy_sensitivity: i64,
}

/// Indicator lookback periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_ema_short_period")]
    pub ema_short_period: usize,
    #[serde(default = "default_ema_long_period")]
    pub ema_long_period: usize,
    #[serde(default = "default_macd_fast_period")]
    pub macd_fast_period: usize,
    #[serde(default = "default_macd_slow_period")]
    pub macd_slow_period: usize,
    #[serde(default = "default_macd_signal_period")]
    pub macd_signal_period: usize,
    #[serde(default = "default_stochastic_k_period")]
    pub stochastic_k_period: usize,
    /// Only participates in the Stochastic insufficient-data guard
    /// (`len < k_period + d_period`); %D itself is not computed.
    #[serde(default = "default_stochastic_d_period")]
    pub stochastic_d_period: usize,
}

/// Demo feed simulator parameters (binary only; the library core never
/// reads these).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default = "default_base_price")]
    pub base_price: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl EngineConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: EngineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!(
            "Loaded config: min_confidence={:.2}, sensitivity={}, instrument={}",
            config.settings.min_confidence,
            config.settings.strategy_sensitivity,
            config.feed.instrument
        );

        Ok(config)
    }
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            strategy_sensitivity: default_strategy_sensitivity(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            ema_short_period: default_ema_short_period(),
            ema_long_period: default_ema_long_period(),
            macd_fast_period: default_macd_fast_period(),
            macd_slow_period: default_macd_slow_period(),
            macd_signal_period: default_macd_signal_period(),
            stochastic_k_period: default_stochastic_k_period(),
            stochastic_d_period: default_stochastic_d_period(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            base_price: default_base_price(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.75
}
fn default_strategy_sensitivity() -> i64 {
    6
}
fn default_rsi_period() -> usize {
    14
}
fn default_ema_short_period() -> usize {
    10
}
fn default_ema_long_period() -> usize {
    20
}
fn default_macd_fast_period() -> usize {
    12
}
fn default_macd_slow_period() -> usize {
    26
}
fn default_macd_signal_period() -> usize {
    9
}
fn default_stochastic_k_period() -> usize {
    14
}
fn default_stochastic_d_period() -> usize {
    3
}
fn default_instrument() -> String {
    "EUR/USD".to_string()
}
fn default_base_price() -> f64 {
    1.0850
}
fn default_tick_interval_ms() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.settings.min_confidence, 0.75);
        assert_eq!(config.settings.strategy_sensitivity, 6);
        assert_eq!(config.indicators.rsi_period, 14);
        assert_eq!(config.indicators.ema_short_period, 10);
        assert_eq!(config.indicators.ema_long_period, 20);
        assert_eq!(config.indicators.macd_fast_period, 12);
        assert_eq!(config.indicators.macd_slow_period, 26);
        assert_eq!(config.indicators.macd_signal_period, 9);
        assert_eq!(config.indicators.stochastic_k_period, 14);
        assert_eq!(config.indicators.stochastic_d_period, 3);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"settings": {"min_confidence": 0.6}}"#).unwrap();
        assert_eq!(config.settings.min_confidence, 0.6);
        assert_eq!(config.settings.strategy_sensitivity, 6);
        assert_eq!(config.indicators.rsi_period, 14);
    }
}

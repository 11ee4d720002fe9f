//! Minute-candle trading signal engine.
//!
//! Ingests timestamped price ticks for one selected instrument, aggregates
//! them into 1-minute OHLC candles, computes a basket of technical
//! indicators (RSI, EMA, MACD, Stochastic %K, moving-average trend) and
//! emits a buy/sell/neutral signal with a confidence score at most once per
//! wall-clock minute.

pub mod candles;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod scheduler;

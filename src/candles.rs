use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of sealed candles retained per instrument.
pub const HISTORY_CAPACITY: usize = 100;

/// Candle interval in milliseconds (one minute).
const INTERVAL_MS: i64 = 60_000;

/// A single price observation from the feed. Ticks are ephemeral: they are
/// consumed by the aggregator and never stored.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// One-minute OHLC candle. Immutable once sealed into the history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Minute index: floor(observed_at millis / 60_000).
    pub interval_start: i64,
}

impl Candle {
    fn seeded(price: f64, interval_start: i64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            interval_start,
        }
    }

    fn absorb(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Chronologically ordered sealed candles, FIFO-bounded to
/// [`HISTORY_CAPACITY`] entries.
#[derive(Debug, Clone, Default)]
pub struct CandleHistory {
    candles: Vec<Candle>,
}

impl CandleHistory {
    pub fn new() -> Self {
        Self {
            candles: Vec::new(),
        }
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
        if self.candles.len() > HISTORY_CAPACITY {
            let excess = self.candles.len() - HISTORY_CAPACITY;
            self.candles.drain(0..excess);
        }
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }
}

/// Folds ticks into one-minute candles. Owns the single in-progress candle
/// for the instrument it serves.
#[derive(Debug, Clone, Default)]
pub struct CandleAggregator {
    current: Option<Candle>,
}

impl CandleAggregator {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Fold one tick into the in-progress candle. Returns the sealed candle
    /// when the tick crosses a minute boundary; the triggering tick seeds the
    /// next candle and is never counted in the sealed one.
    ///
    /// A gap spanning several minutes still produces a single seal+reopen;
    /// skipped intervals are not backfilled. Accepted limitation of the
    /// one-candle-in-flight model.
    pub fn ingest(&mut self, tick: Tick) -> Option<Candle> {
        let minute_index = tick.observed_at.timestamp_millis().div_euclid(INTERVAL_MS);

        match self.current.as_mut() {
            None => {
                self.current = Some(Candle::seeded(tick.price, minute_index));
                None
            }
            Some(candle) if minute_index - candle.interval_start >= 1 => {
                let sealed = *candle;
                self.current = Some(Candle::seeded(tick.price, minute_index));
                Some(sealed)
            }
            Some(candle) => {
                candle.absorb(tick.price);
                None
            }
        }
    }

    /// Drop the unsealed candle, e.g. on stop or instrument switch.
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }
}

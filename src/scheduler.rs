use crate::candles::{CandleAggregator, CandleHistory, Tick};
use crate::config::{EngineConfig, SignalSettings};
use crate::engine::{Direction, MIN_HISTORY, Signal, SignalEngine, SignalOrigin};
use chrono::{DateTime, Timelike, Utc};
use log::{debug, info, warn};
use rand::Rng;

/// Scheduler lifecycle. `Active` carries the single instrument under
/// analysis; switching instruments resets all per-run state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Active { instrument: String },
}

/// Drives the signal engine from two triggers: candle completion and the
/// once-per-minute wall-clock tick. Owns the candle history, the in-progress
/// candle and the minute guard, all touched from a single logical thread.
#[derive(Debug)]
pub struct SignalScheduler {
    settings: SignalSettings,
    engine: SignalEngine,
    state: SchedulerState,
    aggregator: CandleAggregator,
    history: CandleHistory,
    /// Wall-clock minute of the last dispatch; -1 when no signal has been
    /// dispatched yet. At most one dispatch proceeds per minute.
    last_signal_minute: i64,
}

impl SignalScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            settings: config.settings.clone(),
            engine: SignalEngine::new(config.indicators.clone()),
            state: SchedulerState::Idle,
            aggregator: CandleAggregator::new(),
            history: CandleHistory::new(),
            last_signal_minute: -1,
        }
    }

    /// Begin analyzing an instrument. Starting while already active behaves
    /// as an instrument switch.
    pub fn start(&mut self, instrument: &str) {
        if self.state != SchedulerState::Idle {
            self.switch_instrument(instrument);
            return;
        }
        info!("Scheduler started for {}", instrument);
        self.state = SchedulerState::Active {
            instrument: instrument.to_string(),
        };
    }

    /// Halt analysis and discard all in-flight state: the unsealed candle,
    /// the history and the minute guard. No partial state survives a
    /// stop/start cycle.
    pub fn stop(&mut self) {
        if self.state == SchedulerState::Idle {
            return;
        }
        info!("Scheduler stopped");
        self.state = SchedulerState::Idle;
        self.reset_series();
    }

    /// Swap the instrument under analysis, atomically resetting the candle
    /// series first so price histories of different instruments never mix.
    pub fn switch_instrument(&mut self, instrument: &str) {
        info!("Switching instrument to {}", instrument);
        self.reset_series();
        self.state = SchedulerState::Active {
            instrument: instrument.to_string(),
        };
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SchedulerState::Active { .. })
    }

    pub fn instrument(&self) -> Option<&str> {
        match &self.state {
            SchedulerState::Active { instrument } => Some(instrument),
            SchedulerState::Idle => None,
        }
    }

    pub fn history(&self) -> &CandleHistory {
        &self.history
    }

    /// Candle-completion trigger: fold a tick into the aggregator and, when
    /// it seals a candle, attempt a dispatch. Ticks for non-selected
    /// instruments (stale subscriptions) are dropped.
    pub fn on_price_tick(
        &mut self,
        instrument: &str,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Option<Signal> {
        match &self.state {
            SchedulerState::Active { instrument: selected } if selected == instrument => {}
            _ => return None,
        }

        let sealed = self.aggregator.ingest(Tick { price, observed_at })?;
        debug!(
            "Sealed candle for {}: o={:.5} h={:.5} l={:.5} c={:.5}",
            instrument, sealed.open, sealed.high, sealed.low, sealed.close
        );
        self.history.push(sealed);

        // The candle path never fabricates signals; with too little history
        // it simply waits for more candles.
        self.maybe_dispatch(observed_at, false)
    }

    /// Wall-clock trigger, checked on a 1-second poll: fires on the minute
    /// boundary (second == 0). With insufficient history this path emits the
    /// synthetic fallback instead of invoking the engine.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<Signal> {
        if !self.is_active() || now.second() != 0 {
            return None;
        }
        self.maybe_dispatch(now, true)
    }

    /// Single entry point both triggers funnel through. The minute guard is
    /// set before dispatch so a re-entrant trigger in the same tick cannot
    /// double-fire; a failed dispatch leaves it set (no retry until the next
    /// natural trigger in a later minute).
    fn maybe_dispatch(&mut self, now: DateTime<Utc>, allow_synthetic: bool) -> Option<Signal> {
        if self.history.len() < MIN_HISTORY && !allow_synthetic {
            return None;
        }

        let minute = now.timestamp_millis().div_euclid(60_000);
        if minute == self.last_signal_minute {
            return None;
        }
        self.last_signal_minute = minute;

        if self.history.len() >= MIN_HISTORY {
            match self
                .engine
                .decide(self.history.as_slice(), self.settings.strategy_sensitivity)
            {
                Ok(signal) => self.surface(signal),
                Err(e) => {
                    warn!("Signal computation failed: {:#}", e);
                    None
                }
            }
        } else {
            Some(self.synthetic_signal()).filter(|s| s.direction != Direction::Neutral)
        }
    }

    /// Apply the minimum-confidence filter to an indicator-driven signal.
    fn surface(&self, signal: Signal) -> Option<Signal> {
        if signal.confidence >= self.settings.min_confidence {
            info!(
                "Signal: {:?} confidence={:.0}%",
                signal.direction,
                signal.confidence * 100.0
            );
            Some(signal)
        } else {
            debug!(
                "Signal suppressed, confidence {:.0}% below minimum {:.0}%",
                signal.confidence * 100.0,
                self.settings.min_confidence * 100.0
            );
            None
        }
    }

    /// Fabricated stand-in for "insufficient data": uniform direction and a
    /// confidence in [0.70, 0.95], tagged `Synthetic` so consumers can tell
    /// it apart from indicator-driven output. Neutral draws are discarded by
    /// the caller. The min-confidence filter applies to indicator-driven
    /// signals only, so it is skipped here.
    fn synthetic_signal(&self) -> Signal {
        let mut rng = rand::rng();
        let direction = match rng.random_range(0..3) {
            0 => Direction::Buy,
            1 => Direction::Sell,
            _ => Direction::Neutral,
        };
        let confidence = 0.70 + rng.random::<f64>() * 0.25;

        debug!(
            "Synthetic signal (history={} candles): {:?} confidence={:.0}%",
            self.history.len(),
            direction,
            confidence * 100.0
        );

        Signal {
            direction,
            confidence,
            origin: SignalOrigin::Synthetic,
        }
    }

    fn reset_series(&mut self) {
        self.aggregator.reset();
        self.history.clear();
        self.last_signal_minute = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(minute: i64, second: u32) -> DateTime<Utc> {
        base_time() + chrono::Duration::seconds(minute * 60 + second as i64)
    }

    fn scheduler() -> SignalScheduler {
        let mut config = EngineConfig::default();
        config.settings.min_confidence = 0.0;
        SignalScheduler::new(&config)
    }

    /// Two ticks per minute: one mid-minute, one at the boundary sealing the
    /// previous candle.
    fn feed_minutes(sched: &mut SignalScheduler, instrument: &str, minutes: i64, step: f64) {
        for m in 0..minutes {
            let price = 100.0 + m as f64 * step;
            sched.on_price_tick(instrument, price, at(m, 10));
            sched.on_price_tick(instrument, price, at(m, 40));
        }
    }

    #[test]
    fn test_idle_scheduler_ignores_ticks() {
        let mut sched = scheduler();
        assert!(sched.on_price_tick("EUR/USD", 100.0, at(0, 0)).is_none());
        assert_eq!(sched.history().len(), 0);
    }

    #[test]
    fn test_ticks_for_other_instruments_dropped() {
        let mut sched = scheduler();
        sched.start("EUR/USD");
        sched.on_price_tick("GBP/USD", 100.0, at(0, 10));
        sched.on_price_tick("GBP/USD", 101.0, at(1, 10));
        assert_eq!(sched.history().len(), 0);
    }

    #[test]
    fn test_no_dispatch_below_twenty_candles_on_candle_path() {
        let mut sched = scheduler();
        sched.start("EUR/USD");

        // 20 minutes of ticks seal 19 candles (the 20th is in flight).
        feed_minutes(&mut sched, "EUR/USD", 20, 1.0);
        assert_eq!(sched.history().len(), 19);

        // The sealing ticks above produced no signal and left the guard
        // unset, so the next rollover can still dispatch.
        let signal = sched.on_price_tick("EUR/USD", 120.0, at(20, 0));
        assert_eq!(sched.history().len(), 20);
        assert!(signal.is_some());
        assert_eq!(signal.unwrap().origin, SignalOrigin::Indicator);
    }

    #[test]
    fn test_minute_guard_allows_one_dispatch_per_minute() {
        let mut sched = scheduler();
        sched.start("EUR/USD");
        feed_minutes(&mut sched, "EUR/USD", 25, 1.0);

        // feed_minutes sealed candles each minute and the guard was set on
        // the first dispatch past 20 candles. A second trigger in the last
        // minute must be suppressed.
        let first = sched.on_price_tick("EUR/USD", 130.0, at(25, 0));
        assert!(first.is_some());
        let second = sched.poll(at(25, 0));
        assert!(second.is_none());
        let third = sched.on_price_tick("EUR/USD", 131.0, at(25, 30));
        assert!(third.is_none());
    }

    #[test]
    fn test_poll_fires_only_on_minute_boundary() {
        let mut sched = scheduler();
        sched.start("EUR/USD");
        feed_minutes(&mut sched, "EUR/USD", 25, 1.0);

        assert!(sched.poll(at(30, 17)).is_none());
        let signal = sched.poll(at(30, 0));
        assert!(signal.is_some());
        assert_eq!(signal.unwrap().origin, SignalOrigin::Indicator);
    }

    #[test]
    fn test_poll_with_insufficient_history_is_synthetic_or_discarded_neutral() {
        let mut sched = scheduler();
        sched.start("EUR/USD");
        feed_minutes(&mut sched, "EUR/USD", 5, 1.0);

        for m in 0..50 {
            if let Some(signal) = sched.poll(at(100 + m, 0)) {
                assert_eq!(signal.origin, SignalOrigin::Synthetic);
                assert_ne!(signal.direction, Direction::Neutral);
                assert!((0.70..=0.95).contains(&signal.confidence));
            }
        }
    }

    #[test]
    fn test_synthetic_dispatch_consumes_the_minute() {
        let mut sched = scheduler();
        sched.start("EUR/USD");

        sched.poll(at(7, 0));
        // Guard is set whether or not the draw was neutral; a second poll in
        // the same minute never fires.
        assert!(sched.poll(at(7, 0)).is_none());
        assert!(sched.poll(at(7, 30)).is_none());
    }

    #[test]
    fn test_stop_discards_all_state() {
        let mut sched = scheduler();
        sched.start("EUR/USD");
        feed_minutes(&mut sched, "EUR/USD", 25, 1.0);
        assert!(sched.history().len() >= 20);

        sched.stop();
        assert!(!sched.is_active());
        assert_eq!(sched.history().len(), 0);
        assert!(sched.on_price_tick("EUR/USD", 100.0, at(40, 0)).is_none());
    }

    #[test]
    fn test_switch_instrument_resets_series() {
        let mut sched = scheduler();
        sched.start("EUR/USD");
        feed_minutes(&mut sched, "EUR/USD", 25, 1.0);
        assert!(sched.history().len() >= 20);

        sched.switch_instrument("GBP/USD");
        assert_eq!(sched.instrument(), Some("GBP/USD"));
        assert_eq!(sched.history().len(), 0);

        // Old instrument's ticks no longer land anywhere.
        sched.on_price_tick("EUR/USD", 200.0, at(30, 10));
        assert_eq!(sched.history().len(), 0);
    }

    #[test]
    fn test_min_confidence_filter_suppresses_weak_signals() {
        let mut config = EngineConfig::default();
        config.settings.min_confidence = 0.99; // above the 0.95 cap
        let mut sched = SignalScheduler::new(&config);
        sched.start("EUR/USD");
        feed_minutes(&mut sched, "EUR/USD", 25, 1.0);

        let signal = sched.on_price_tick("EUR/USD", 130.0, at(25, 0));
        assert!(signal.is_none());
        // Suppression still consumed the minute.
        assert!(sched.poll(at(25, 0)).is_none());
    }
}

use anyhow::Result;
use chrono::Utc;
use log::{debug, info};
use rand::Rng;
use std::env;
use tokio::time::{Duration, interval};

use signalbot::config::EngineConfig;
use signalbot::engine::SignalOrigin;
use signalbot::scheduler::SignalScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG not set
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();
    info!("Starting signal bot");

    // Get config file from command line argument or use default
    let args: Vec<String> = env::args().collect();
    let config_file = if args.len() > 1 { &args[1] } else { "config.json" };

    let config = match EngineConfig::load_from_file(config_file) {
        Ok(config) => config,
        Err(e) => {
            info!("{:#}; using defaults", e);
            EngineConfig::default()
        }
    };

    let instrument = config.feed.instrument.clone();
    let base_price = config.feed.base_price;
    let tick_interval_ms = config.feed.tick_interval_ms;

    let mut scheduler = SignalScheduler::new(&config);
    scheduler.start(&instrument);

    // Random-walk feed simulator standing in for a real exchange connection,
    // plus the 1-second wall-clock poll. Both drive the scheduler from this
    // single task.
    let mut price = base_price;
    let mut tick_timer = interval(Duration::from_millis(tick_interval_ms));
    let mut poll_timer = interval(Duration::from_secs(1));

    info!(
        "Simulating feed for {} from base price {:.5}",
        instrument, base_price
    );

    loop {
        tokio::select! {
            _ = tick_timer.tick() => {
                price *= 1.0 + rand::rng().random_range(-0.0005..0.0005);
                debug!("Tick {} @ {:.5}", instrument, price);
                if let Some(signal) = scheduler.on_price_tick(&instrument, price, Utc::now()) {
                    render(&instrument, signal.direction, signal.confidence, signal.origin);
                }
            }
            _ = poll_timer.tick() => {
                if let Some(signal) = scheduler.poll(Utc::now()) {
                    render(&instrument, signal.direction, signal.confidence, signal.origin);
                }
            }
        }
    }
}

fn render(
    instrument: &str,
    direction: signalbot::engine::Direction,
    confidence: f64,
    origin: SignalOrigin,
) {
    let tag = match origin {
        SignalOrigin::Indicator => "",
        SignalOrigin::Synthetic => " [synthetic]",
    };
    info!(
        "{}: {:?} ({:.0}%){}",
        instrument,
        direction,
        confidence * 100.0,
        tag
    );
}

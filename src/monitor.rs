//! Live monitoring loop.
//!
//! Single-threaded polling: every interval, pull one price from the
//! quote source and run it through the tracker. Nothing in the loop is
//! allowed to abort it — a missing quote or a fetch error degrades to
//! "no action this cycle".

use crate::bars::load_bars;
use crate::lifecycle::PositionLifecycleTracker;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Latest-price boundary for the live path. The real feed lives
/// upstream; `Ok(None)` is the documented "no quote right now" case.
pub trait QuoteSource {
    fn latest_price(&mut self) -> Result<Option<f64>>;
}

/// Reads the newest close from a bar CSV that an upstream fetcher keeps
/// appending to. A missing file is a quiet cycle, not an error.
pub struct CsvTailSource {
    path: PathBuf,
}

impl CsvTailSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl QuoteSource for CsvTailSource {
    fn latest_price(&mut self) -> Result<Option<f64>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bars = load_bars(&self.path)?;
        Ok(bars.last().map(|b| b.close))
    }
}

/// Poll until every tracked position has closed or ctrl-c arrives.
pub async fn run_monitor(
    mut tracker: PositionLifecycleTracker,
    mut source: impl QuoteSource,
    poll_seconds: u64,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_seconds.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        "monitoring {} position(s) every {}s",
        tracker.open_positions().len(),
        poll_seconds
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, stopping monitor");
                return Ok(());
            }
            _ = ticker.tick() => {
                match source.latest_price() {
                    Ok(Some(price)) => {
                        for event in tracker.on_price(price) {
                            info!("{}", event.text.replace('\n', " | "));
                            println!("{}", event.text);
                        }
                        if tracker.open_positions().is_empty() {
                            info!("all positions closed, monitor done");
                            return Ok(());
                        }
                    }
                    Ok(None) => debug!("no quote this cycle"),
                    Err(e) => warn!("quote fetch failed: {e:#}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SentinelConfig;
    use crate::setup::{Direction, Target, TradeClass, TradeSetup};
    use std::io::Write;

    struct FixedQuote(f64);

    impl QuoteSource for FixedQuote {
        fn latest_price(&mut self) -> Result<Option<f64>> {
            Ok(Some(self.0))
        }
    }

    fn long_setup() -> TradeSetup {
        TradeSetup {
            direction: Direction::Long,
            entry: 100.0,
            stop: 85.0,
            risk_distance: 15.0,
            targets: vec![Target {
                price: 115.0,
                size_fraction: 1.0,
                hit_probability: 70.0,
            }],
            support_levels: vec![],
            resistance_levels: vec![],
            volatility: 10.0,
            trade_class: TradeClass::Day,
        }
    }

    #[test]
    fn test_csv_tail_source_reads_last_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2025-06-02T14:30:00Z,100,101,99,100.5,10").unwrap();
        writeln!(f, "2025-06-02T15:30:00Z,100.5,102,100,101.25,12").unwrap();
        drop(f);

        let mut source = CsvTailSource::new(&path);
        assert_eq!(source.latest_price().unwrap(), Some(101.25));
    }

    #[test]
    fn test_csv_tail_source_absent_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = CsvTailSource::new(dir.path().join("nope.csv"));
        assert_eq!(source.latest_price().unwrap(), None);
    }

    #[tokio::test]
    async fn test_monitor_exits_when_all_positions_close() {
        let mut tracker = PositionLifecycleTracker::new(SentinelConfig::default());
        assert!(tracker.add(long_setup()));

        // Price sits through the stop: first tick closes everything
        run_monitor(tracker, FixedQuote(80.0), 1).await.unwrap();
    }
}

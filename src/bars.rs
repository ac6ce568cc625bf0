//! OHLCV bar type and CSV series loading.
//!
//! Bar series are produced by the upstream data feed and are read-only
//! here: every component takes `&[Bar]` and never mutates it.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One aggregated price record for a time interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// True range against the prior close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Load a bar series from CSV with columns
/// `timestamp,open,high,low,close,volume` (RFC 3339 timestamps).
///
/// The series must be strictly increasing in time; a regression means the
/// upstream export is broken and we refuse to trade on it.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening bar series {:?}", path))?;

    let mut bars: Vec<Bar> = Vec::new();
    for (i, record) in reader.deserialize().enumerate() {
        let bar: Bar = record.with_context(|| format!("bad bar record at row {}", i + 1))?;
        if let Some(prev) = bars.last() {
            if bar.timestamp <= prev.timestamp {
                bail!(
                    "bar series not monotonic at row {}: {} <= {}",
                    i + 1,
                    bar.timestamp,
                    prev.timestamp
                );
            }
        }
        bars.push(bar);
    }

    Ok(bars)
}

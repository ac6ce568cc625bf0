//! Volatility measurement boundary.
//!
//! The setup calculator only consumes a single "average range" scalar for
//! the most recent bar. Where that number comes from is a collaborator
//! concern, so it sits behind a trait with an explicit absent case: a
//! source that cannot produce a value returns `None` and the caller
//! degrades to the no-trade setup.

use crate::bars::Bar;

/// Supplies an average-range scalar for the most recent bar of a series
pub trait VolatilitySource: Send + Sync {
    /// `None` when the series is too short or the measure is degenerate
    fn average_range(&self, bars: &[Bar]) -> Option<f64>;
}

/// Average true range over a fixed window
#[derive(Debug, Clone)]
pub struct AtrVolatility {
    pub period: usize,
}

impl Default for AtrVolatility {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl VolatilitySource for AtrVolatility {
    fn average_range(&self, bars: &[Bar]) -> Option<f64> {
        if self.period == 0 || bars.len() < self.period + 1 {
            return None;
        }

        // True range needs the prior close, so window starts one bar early
        let start = bars.len() - self.period;
        let sum: f64 = (start..bars.len())
            .map(|i| bars[i].true_range(bars[i - 1].close))
            .sum();
        let atr = sum / self.period as f64;

        (atr > 0.0).then_some(atr)
    }
}

/// A source with no data behind it. Always absent; forces the sentinel
/// no-trade path downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVolatility;

impl VolatilitySource for NoVolatility {
    fn average_range(&self, _bars: &[Bar]) -> Option<f64> {
        None
    }
}

//! Entry signal boundary.
//!
//! Direction and confidence come from an upstream signal source; the
//! core only consumes them. [`EntryPolicy`] is the capability interface
//! for that source so the simulator and the live path share one policy.
//! [`ScorePolicy`] is the default: a 0-100 momentum score over rolling
//! price features, mapped through an inverted threshold (a stretched
//! score fades the move, mean-reversion style).

use crate::bars::Bar;
use crate::setup::Direction;

/// A directional signal with its confidence in [0, 1]
#[derive(Debug, Clone, Copy)]
pub struct EntrySignal {
    pub direction: Direction,
    pub confidence: f64,
    /// Raw 0-100 score the signal was derived from
    pub score: f64,
}

/// Signal source consumed by the simulator and the live scanner
pub trait EntryPolicy: Send + Sync {
    /// Evaluate the series at `index` (inclusive). `None` means no
    /// entry this bar: warmup, neutral score, or the source declining.
    fn evaluate(&self, bars: &[Bar], index: usize) -> Option<EntrySignal>;
}

/// Bars required before the rolling features are meaningful
const WARMUP_BARS: usize = 20;

/// Rule-based momentum scorer with an inverted entry threshold
#[derive(Debug, Clone)]
pub struct ScorePolicy {
    /// Score at or above which the policy fades the move (0-100)
    pub entry_threshold: f64,
}

impl ScorePolicy {
    pub fn new(entry_threshold: f64) -> Self {
        Self { entry_threshold }
    }

    /// 0-100 bullish-pressure score at `index`. 50 is neutral.
    pub fn score(&self, bars: &[Bar], index: usize) -> Option<f64> {
        if index + 1 < WARMUP_BARS || index >= bars.len() {
            return None;
        }

        let window = &bars[..=index];
        let bar = &window[window.len() - 1];
        let close = bar.close;

        let rsi = rsi(window, 14)?;
        let sma_10 = sma(window, 10)?;
        let sma_20 = sma(window, 20)?;
        let sma_50 = sma(window, 50);

        let mut score: f64 = 50.0;

        // RSI band scoring with overbought/oversold pullbacks
        if rsi > 60.0 {
            score += 15.0;
        } else if rsi > 50.0 {
            score += 8.0;
        } else if rsi < 40.0 {
            score -= 15.0;
        } else if rsi < 50.0 {
            score -= 8.0;
        }
        if rsi > 70.0 {
            score -= 10.0;
        }
        if rsi < 30.0 {
            score += 10.0;
        }

        // Price vs moving averages
        score += if close > sma_10 { 8.0 } else { -8.0 };
        score += if close > sma_20 { 6.0 } else { -6.0 };
        if let Some(sma_50) = sma_50 {
            score += if close > sma_50 { 4.0 } else { -4.0 };
        }

        // Short-term trend alignment
        score += if sma_10 > sma_20 { 8.0 } else { -8.0 };

        // Current candle
        score += if close > bar.open { 5.0 } else { -5.0 };

        Some(score.clamp(0.0, 100.0))
    }
}

impl EntryPolicy for ScorePolicy {
    fn evaluate(&self, bars: &[Bar], index: usize) -> Option<EntrySignal> {
        let score = self.score(bars, index)?;

        // Inverted mapping: a stretched score is faded
        let direction = if score >= self.entry_threshold {
            Direction::Short
        } else if score <= 100.0 - self.entry_threshold {
            Direction::Long
        } else {
            return None;
        };

        Some(EntrySignal {
            direction,
            confidence: (score - 50.0).abs() * 2.0 / 100.0,
            score,
        })
    }
}

/// Simple moving average of the closes ending at the window's last bar
fn sma(window: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || window.len() < period {
        return None;
    }
    let sum: f64 = window[window.len() - period..].iter().map(|b| b.close).sum();
    Some(sum / period as f64)
}

/// RSI over close-to-close changes (simple averaging)
fn rsi(window: &[Bar], period: usize) -> Option<f64> {
    if window.len() < period + 1 {
        return None;
    }
    let closes: Vec<f64> = window[window.len() - period - 1..]
        .iter()
        .map(|b| b.close)
        .collect();

    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in closes.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Bar {
                    timestamp: t0 + Duration::hours(i as i64),
                    open,
                    high: close.max(open) + 1.0,
                    low: close.min(open) - 1.0,
                    close,
                    volume: 100,
                }
            })
            .collect()
    }

    #[test]
    fn test_no_signal_during_warmup() {
        let bars = bars_from_closes(&[100.0; 30]);
        let policy = ScorePolicy::new(60.0);
        assert!(policy.evaluate(&bars, 5).is_none());
    }

    #[test]
    fn test_steady_rally_scores_bullish_and_fades_short() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 2.0).collect();
        let bars = bars_from_closes(&closes);
        let policy = ScorePolicy::new(60.0);

        let score = policy.score(&bars, 39).unwrap();
        assert!(score > 60.0, "rally should score bullish, got {score}");

        let signal = policy.evaluate(&bars, 39).unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert!(signal.confidence > 0.0 && signal.confidence <= 1.0);
    }

    #[test]
    fn test_steady_selloff_fades_long() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64 * 2.0).collect();
        let bars = bars_from_closes(&closes);
        let policy = ScorePolicy::new(60.0);

        let signal = policy.evaluate(&bars, 39).unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn test_mid_band_score_yields_no_signal() {
        // Alternating closes keep RSI pinned at 50; the remaining terms
        // land the score just above neutral, inside a wide band
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 100.2 })
            .collect();
        let bars = bars_from_closes(&closes);
        let policy = ScorePolicy::new(70.0);

        let score = policy.score(&bars, 39).unwrap();
        assert!(score > 30.0 && score < 70.0, "expected mid-band, got {score}");
        assert!(policy.evaluate(&bars, 39).is_none());
    }

    #[test]
    fn test_score_is_pure() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let bars = bars_from_closes(&closes);
        let policy = ScorePolicy::new(60.0);

        assert_eq!(policy.score(&bars, 39), policy.score(&bars, 39));
    }
}

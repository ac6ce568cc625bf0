//! Configuration for setup calculation, lifecycle tracking and replay.
//!
//! One value struct, passed explicitly at every call boundary. Nothing in
//! this crate reads configuration from global state.

/// Tunable parameters shared by the live and replay paths
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// Stop distance as a multiple of the average range
    pub stop_multiplier: f64,
    /// Target ladder as risk multiples, nearest first
    pub target_risk_multiples: Vec<f64>,
    /// Position fraction to close at each rung; must sum to <= 1.0
    pub target_size_fractions: Vec<f64>,
    /// Bars scanned for swing highs/lows
    pub swing_lookback: usize,
    /// Round-number increment for synthesized levels
    pub round_level_step: f64,
    /// Entry distance (points) under which a new signal is a duplicate
    pub duplicate_tolerance: f64,
    /// Cap on concurrently tracked positions; oldest evicted beyond this
    pub max_tracked_positions: usize,
    /// Replay holding horizon in bars before a forced time exit
    pub max_holding_bars: usize,
    /// Score at or above which the entry policy fires (0-100)
    pub entry_threshold: f64,
    /// Averaging window for the true-range volatility source
    pub atr_period: usize,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            stop_multiplier: 1.5,
            target_risk_multiples: vec![1.5, 2.5, 4.0, 6.0],
            target_size_fractions: vec![0.50, 0.30, 0.15, 0.05],
            swing_lookback: 50,
            round_level_step: 50.0, // NQ trades round 50s
            duplicate_tolerance: 2.0,
            max_tracked_positions: 5,
            max_holding_bars: 48, // 2 days of hourly bars
            entry_threshold: 60.0,
            atr_period: 14,
        }
    }
}

impl SentinelConfig {
    /// Number of rungs in the target ladder (multiples and fractions zipped)
    pub fn ladder_len(&self) -> usize {
        self.target_risk_multiples
            .len()
            .min(self.target_size_fractions.len())
    }
}

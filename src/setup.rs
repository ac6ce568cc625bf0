//! Trade setup calculation.
//!
//! Given a bar series, a direction and a confidence score, produce the
//! full plan: entry at the last close, a volatility-scaled protective
//! stop, a laddered sequence of profit targets with size fractions and
//! hit probabilities, nearby support/resistance, and a duration class.
//!
//! Setups are value objects: built once per signal, never mutated. A
//! degenerate input (short series, absent or zero volatility) produces
//! the all-zero no-trade sentinel instead of an error, so callers must
//! check [`TradeSetup::is_actionable`] before tracking.

use crate::bars::Bar;
use crate::config::SentinelConfig;
use crate::levels::{self, ExpertLevels, LevelSide};
use crate::volatility::VolatilitySource;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short; signs favorable movement
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Expected holding period, classified from target distance vs volatility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeClass {
    Scalp,
    Day,
    Swing,
    Unknown,
}

impl TradeClass {
    /// Classify by first-target distance as a multiple of the average
    /// range. The ratio, not the absolute distance, is the classifier so
    /// it scales with instrument volatility.
    pub fn classify(first_target_distance: f64, volatility: f64) -> Self {
        if volatility <= 0.0 {
            return TradeClass::Unknown;
        }
        let ratio = first_target_distance / volatility;
        if ratio < 1.0 {
            TradeClass::Scalp
        } else if ratio < 2.0 {
            TradeClass::Day
        } else {
            TradeClass::Swing
        }
    }

    /// Rough time-to-target guidance shown in alerts
    pub fn expected_duration(&self) -> &'static str {
        match self {
            TradeClass::Scalp => "15-60 min",
            TradeClass::Day => "2-6 hours",
            TradeClass::Swing => "1-3 days",
            TradeClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TradeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeClass::Scalp => write!(f, "SCALP"),
            TradeClass::Day => write!(f, "DAY"),
            TradeClass::Swing => write!(f, "SWING"),
            TradeClass::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One rung of the profit ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub price: f64,
    /// Fraction of the position to close at this rung
    pub size_fraction: f64,
    /// Estimated hit probability in percent, clamped to [5, 95]
    pub hit_probability: f64,
}

/// A complete trade plan, immutable once built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSetup {
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    /// |entry - stop|; zero marks the no-trade sentinel
    pub risk_distance: f64,
    /// Strictly increasing favorable distance from entry
    pub targets: Vec<Target>,
    /// Nearest first, exactly three when actionable
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    /// Average range the stop and targets were scaled from
    pub volatility: f64,
    pub trade_class: TradeClass,
}

impl TradeSetup {
    /// The no-trade sentinel: all numeric fields zero, class Unknown
    pub fn no_trade(direction: Direction) -> Self {
        Self {
            direction,
            entry: 0.0,
            stop: 0.0,
            risk_distance: 0.0,
            targets: Vec::new(),
            support_levels: Vec::new(),
            resistance_levels: Vec::new(),
            volatility: 0.0,
            trade_class: TradeClass::Unknown,
        }
    }

    /// False for the sentinel; callers must not track a non-actionable setup
    pub fn is_actionable(&self) -> bool {
        self.risk_distance > 0.0 && !self.targets.is_empty()
    }

    /// Price of the last rung of the ladder
    pub fn final_target(&self) -> Option<f64> {
        self.targets.last().map(|t| t.price)
    }
}

/// Hit-probability bases per rung; nudged by confidence, clamped [5, 95]
const BASE_HIT_PROBABILITY: [f64; 4] = [70.0, 55.0, 35.0, 20.0];

/// Builds [`TradeSetup`]s from a bar series and an upstream signal
pub struct SetupCalculator {
    config: SentinelConfig,
    volatility: Box<dyn VolatilitySource>,
    expert: Option<ExpertLevels>,
}

impl SetupCalculator {
    pub fn new(config: SentinelConfig, volatility: Box<dyn VolatilitySource>) -> Self {
        Self {
            config,
            volatility,
            expert: None,
        }
    }

    /// Merge externally asserted key levels into support/resistance
    pub fn with_expert_levels(mut self, expert: Option<ExpertLevels>) -> Self {
        self.expert = expert;
        self
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Compute the full plan. Never fails: degenerate inputs return the
    /// no-trade sentinel.
    pub fn build(&self, bars: &[Bar], direction: Direction, confidence: f64) -> TradeSetup {
        let Some(last) = bars.last() else {
            warn!("setup requested on empty bar series");
            return TradeSetup::no_trade(direction);
        };

        let Some(volatility) = self.volatility.average_range(bars) else {
            warn!("volatility unavailable, emitting no-trade setup");
            return TradeSetup::no_trade(direction);
        };

        let risk_distance = volatility * self.config.stop_multiplier;
        if risk_distance <= 0.0 {
            warn!(
                "non-positive risk distance {:.2}, emitting no-trade setup",
                risk_distance
            );
            return TradeSetup::no_trade(direction);
        }

        if self.config.ladder_len() == 0 {
            warn!("empty target ladder configured, emitting no-trade setup");
            return TradeSetup::no_trade(direction);
        }

        let entry = last.close;
        let sign = direction.sign();
        let stop = entry - sign * risk_distance;

        let targets = self.build_ladder(entry, volatility, sign, confidence);
        let first_target_distance = volatility * self.sorted_multiples()[0];
        let trade_class = TradeClass::classify(first_target_distance, volatility);

        let support_levels = levels::find_levels(
            bars,
            entry,
            self.config.swing_lookback,
            LevelSide::Support,
            self.expert.as_ref(),
            self.config.round_level_step,
        );
        let resistance_levels = levels::find_levels(
            bars,
            entry,
            self.config.swing_lookback,
            LevelSide::Resistance,
            self.expert.as_ref(),
            self.config.round_level_step,
        );

        TradeSetup {
            direction,
            entry,
            stop,
            risk_distance,
            targets,
            support_levels,
            resistance_levels,
            volatility,
            trade_class,
        }
    }

    /// Risk multiples sorted ascending; the ladder invariant (strictly
    /// increasing favorable distance) holds regardless of config order
    fn sorted_multiples(&self) -> Vec<f64> {
        let mut multiples: Vec<f64> = self.config.target_risk_multiples
            [..self.config.ladder_len()]
            .to_vec();
        multiples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        multiples.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        multiples
    }

    /// Target rungs at `volatility x multiple` from entry. With the
    /// default 1.5 stop multiplier the first rung lands at 1R.
    fn build_ladder(
        &self,
        entry: f64,
        volatility: f64,
        sign: f64,
        confidence: f64,
    ) -> Vec<Target> {
        // Linear nudge: confidence 0.5 is neutral, 1.0 adds 15 points
        let nudge = (confidence.clamp(0.0, 1.0) - 0.5) * 30.0;

        // Size fractions must sum to at most 1.0 even when misconfigured
        let fractions = &self.config.target_size_fractions;
        let total: f64 = fractions[..self.config.ladder_len()].iter().sum();
        let scale = if total > 1.0 { 1.0 / total } else { 1.0 };

        self.sorted_multiples()
            .iter()
            .enumerate()
            .map(|(i, &multiple)| {
                let base = BASE_HIT_PROBABILITY
                    .get(i)
                    .copied()
                    .unwrap_or(BASE_HIT_PROBABILITY[BASE_HIT_PROBABILITY.len() - 1] / 2.0);
                Target {
                    price: entry + sign * volatility * multiple,
                    size_fraction: fractions[i.min(fractions.len() - 1)] * scale,
                    hit_probability: (base + nudge).clamp(5.0, 95.0),
                }
            })
            .collect()
    }
}

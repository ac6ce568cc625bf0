//! Position lifecycle: the exit-decision rule and the live tracker.
//!
//! The stop/target decision lives in ONE pure function, [`decide_exit`],
//! consumed by both the live tracker (tick prices) and the historical
//! simulator (bar ranges). The live path passes the tick as both
//! extremes; replay passes the bar's adverse and favorable extremes.
//! Either way the protective stop is checked before any target, so an
//! ambiguous simultaneous touch resolves to the conservative outcome.
//!
//! State machine per position: Open -> Partial -> Closed. Closed is
//! terminal and reached exactly once; the first target hit moves the
//! stop to breakeven and the stop never moves back toward the original
//! adverse level.

use crate::alert;
use crate::config::SentinelConfig;
use crate::journal::TradeJournal;
use crate::setup::{Direction, TradeSetup};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Lifecycle state of a tracked plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Partial,
    Closed,
}

/// Why a position closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCause {
    Stop,
    FinalTarget,
    TimeExit,
}

impl std::fmt::Display for ExitCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCause::Stop => write!(f, "STOP"),
            ExitCause::FinalTarget => write!(f, "FINAL_TARGET"),
            ExitCause::TimeExit => write!(f, "TIME_EXIT"),
        }
    }
}

/// Net verdict of a closed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
}

impl std::fmt::Display for TradeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
            TradeResult::Breakeven => write!(f, "BREAKEVEN"),
        }
    }
}

/// Immutable record of a closed trade, appended to the journal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub closed_at: DateTime<Utc>,
    pub direction: Direction,
    pub entry: f64,
    pub exit_price: f64,
    pub exit_cause: ExitCause,
    pub pnl_points: f64,
    pub result: TradeResult,
    pub tag: String,
}

/// A tracked plan with mutable lifecycle state
#[derive(Debug, Clone)]
pub struct Position {
    pub id: Uuid,
    pub setup: TradeSetup,
    pub status: PositionStatus,
    /// Moves only toward entry or beyond, never back
    pub current_stop: f64,
    targets_hit: Vec<bool>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn new(setup: TradeSetup, created_at: DateTime<Utc>) -> Self {
        let rungs = setup.targets.len();
        let current_stop = setup.stop;
        Self {
            id: Uuid::new_v4(),
            setup,
            status: PositionStatus::Open,
            current_stop,
            targets_hit: vec![false; rungs],
            created_at,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    pub fn target_hit(&self, index: usize) -> bool {
        self.targets_hit.get(index).copied().unwrap_or(false)
    }

    pub fn targets_hit_count(&self) -> usize {
        self.targets_hit.iter().filter(|&&h| h).count()
    }

    /// True once the stop protects the entry (or better)
    pub fn at_breakeven_or_better(&self) -> bool {
        match self.setup.direction {
            Direction::Long => self.current_stop >= self.setup.entry,
            Direction::Short => self.current_stop <= self.setup.entry,
        }
    }

    /// Signed favorable points at an exit fill
    pub fn signed_pnl(&self, fill: f64) -> f64 {
        (fill - self.setup.entry) * self.setup.direction.sign()
    }

    /// Apply an exit decision. Returns the outcome when the decision
    /// closes the position. Idempotent once closed.
    pub fn apply_decision(
        &mut self,
        decision: ExitDecision,
        at: DateTime<Utc>,
    ) -> Option<TradeOutcome> {
        if self.is_closed() {
            return None;
        }

        match decision {
            ExitDecision::Hold => None,
            ExitDecision::StopHit { breakeven } => {
                let fill = self.current_stop;
                self.status = PositionStatus::Closed;
                Some(self.outcome(fill, ExitCause::Stop, breakeven_result(breakeven), at))
            }
            ExitDecision::TargetHit { index, is_final } => {
                if let Some(hit) = self.targets_hit.get_mut(index) {
                    *hit = true;
                }
                let fill = self.setup.targets[index].price;
                if is_final {
                    self.status = PositionStatus::Closed;
                    Some(self.outcome(fill, ExitCause::FinalTarget, TradeResult::Win, at))
                } else {
                    if self.targets_hit_count() == 1 {
                        // First partial: slide the stop to breakeven.
                        // One-way movement; later rungs leave it alone.
                        self.move_stop_to_entry();
                    }
                    self.status = PositionStatus::Partial;
                    None
                }
            }
        }
    }

    /// Force-close at an arbitrary fill (holding-horizon expiry)
    pub fn close_at(&mut self, fill: f64, at: DateTime<Utc>) -> Option<TradeOutcome> {
        if self.is_closed() {
            return None;
        }
        self.status = PositionStatus::Closed;
        let pnl = self.signed_pnl(fill);
        let result = if pnl > 0.0 {
            TradeResult::Win
        } else if pnl < 0.0 {
            TradeResult::Loss
        } else {
            TradeResult::Breakeven
        };
        Some(self.outcome(fill, ExitCause::TimeExit, result, at))
    }

    fn move_stop_to_entry(&mut self) {
        let entry = self.setup.entry;
        match self.setup.direction {
            Direction::Long => {
                if entry > self.current_stop {
                    self.current_stop = entry;
                }
            }
            Direction::Short => {
                if entry < self.current_stop {
                    self.current_stop = entry;
                }
            }
        }
    }

    fn outcome(
        &self,
        fill: f64,
        exit_cause: ExitCause,
        result: TradeResult,
        at: DateTime<Utc>,
    ) -> TradeOutcome {
        TradeOutcome {
            closed_at: at,
            direction: self.setup.direction,
            entry: self.setup.entry,
            exit_price: fill,
            exit_cause,
            pnl_points: self.signed_pnl(fill),
            result,
            tag: self.setup.trade_class.to_string(),
        }
    }
}

fn breakeven_result(breakeven: bool) -> TradeResult {
    if breakeven {
        TradeResult::Breakeven
    } else {
        TradeResult::Loss
    }
}

/// What one price observation means for a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    /// No state change this observation
    Hold,
    /// Protective stop crossed adversely
    StopHit { breakeven: bool },
    /// Lowest-indexed unhit target reached favorably
    TargetHit { index: usize, is_final: bool },
}

/// The shared exit rule. Stop before targets; one transition per
/// observation. For a single tick pass the price as both extremes; for
/// a bar pass its adverse and favorable extremes for the direction.
pub fn decide_exit(position: &Position, adverse_extreme: f64, favorable_extreme: f64) -> ExitDecision {
    if position.is_closed() {
        return ExitDecision::Hold;
    }

    let direction = position.setup.direction;

    let stop_crossed = match direction {
        Direction::Long => adverse_extreme <= position.current_stop,
        Direction::Short => adverse_extreme >= position.current_stop,
    };
    if stop_crossed {
        return ExitDecision::StopHit {
            breakeven: position.at_breakeven_or_better(),
        };
    }

    let last = position.setup.targets.len().saturating_sub(1);
    for (i, target) in position.setup.targets.iter().enumerate() {
        if position.target_hit(i) {
            continue;
        }
        let reached = match direction {
            Direction::Long => favorable_extreme >= target.price,
            Direction::Short => favorable_extreme <= target.price,
        };
        if reached {
            return ExitDecision::TargetHit {
                index: i,
                is_final: i == last,
            };
        }
        // Rungs are ordered by distance; the nearest unhit one decides
        break;
    }

    ExitDecision::Hold
}

/// Event emitted to the alerting surface on a lifecycle transition
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub position_id: Uuid,
    pub text: String,
}

/// Tracks a bounded set of live plans against a polled price
pub struct PositionLifecycleTracker {
    config: SentinelConfig,
    positions: Vec<Position>,
    journal: Option<TradeJournal>,
    outcomes: Vec<TradeOutcome>,
}

impl PositionLifecycleTracker {
    pub fn new(config: SentinelConfig) -> Self {
        Self {
            config,
            positions: Vec::new(),
            journal: None,
            outcomes: Vec::new(),
        }
    }

    /// Persist closed trades to a journal
    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn outcomes(&self) -> &[TradeOutcome] {
        &self.outcomes
    }

    /// Accept a setup for tracking. Returns false (no state change) for
    /// the no-trade sentinel and for duplicate signals: an open position
    /// whose entry is within the duplicate tolerance.
    pub fn add(&mut self, setup: TradeSetup) -> bool {
        if !setup.is_actionable() {
            warn!("rejected no-trade setup");
            return false;
        }

        let duplicate = self
            .positions
            .iter()
            .any(|p| (p.setup.entry - setup.entry).abs() < self.config.duplicate_tolerance);
        if duplicate {
            info!("duplicate signal near {:.2}, skipping", setup.entry);
            return false;
        }

        info!(
            "tracking {} @ {:.2} | stop {:.2} | {} targets",
            setup.direction,
            setup.entry,
            setup.stop,
            setup.targets.len()
        );
        self.positions.push(Position::new(setup, Utc::now()));

        // Resource bound, not a trading decision: drop the oldest plan
        if self.positions.len() > self.config.max_tracked_positions {
            let evicted = self.positions.remove(0);
            warn!(
                "tracked-position cap {} exceeded, evicting oldest {} @ {:.2}",
                self.config.max_tracked_positions, evicted.setup.direction, evicted.setup.entry
            );
        }

        true
    }

    /// Evaluate every tracked position against a new price observation.
    /// Closed positions are journaled, removed, and never touched again.
    pub fn on_price(&mut self, price: f64) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        for position in &mut self.positions {
            let decision = decide_exit(position, price, price);

            let text = match decision {
                ExitDecision::Hold => continue,
                ExitDecision::StopHit { breakeven } => {
                    let fill = position.current_stop;
                    alert::stop_hit(fill, position.signed_pnl(fill), breakeven)
                }
                ExitDecision::TargetHit { index, is_final } => {
                    let fill = position.setup.targets[index].price;
                    let pnl = position.signed_pnl(fill);
                    if is_final {
                        alert::final_target(fill, pnl)
                    } else {
                        let first = position.targets_hit_count() == 0;
                        alert::partial_target(
                            index,
                            fill,
                            pnl,
                            first.then_some(position.setup.entry),
                        )
                    }
                }
            };

            if let Some(outcome) = position.apply_decision(decision, Utc::now()) {
                if let Some(journal) = &self.journal {
                    if let Err(e) = journal.append(&outcome) {
                        error!("journal append failed: {e:#}");
                    }
                }
                self.outcomes.push(outcome);
            }

            events.push(LifecycleEvent {
                position_id: position.id,
                text,
            });
        }

        self.positions.retain(|p| !p.is_closed());
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::{Target, TradeClass};
    use chrono::TimeZone;

    /// Hand-built LONG plan: entry 100, stop 85, targets 115/125/145
    fn long_setup() -> TradeSetup {
        TradeSetup {
            direction: Direction::Long,
            entry: 100.0,
            stop: 85.0,
            risk_distance: 15.0,
            targets: vec![
                Target { price: 115.0, size_fraction: 0.5, hit_probability: 70.0 },
                Target { price: 125.0, size_fraction: 0.3, hit_probability: 55.0 },
                Target { price: 145.0, size_fraction: 0.2, hit_probability: 35.0 },
            ],
            support_levels: vec![95.0, 90.0, 85.0],
            resistance_levels: vec![110.0, 120.0, 130.0],
            volatility: 10.0,
            trade_class: TradeClass::Day,
        }
    }

    fn short_setup() -> TradeSetup {
        TradeSetup {
            direction: Direction::Short,
            entry: 100.0,
            stop: 115.0,
            risk_distance: 15.0,
            targets: vec![
                Target { price: 85.0, size_fraction: 0.5, hit_probability: 70.0 },
                Target { price: 75.0, size_fraction: 0.5, hit_probability: 55.0 },
            ],
            support_levels: vec![],
            resistance_levels: vec![],
            volatility: 10.0,
            trade_class: TradeClass::Day,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_stop_before_any_target_is_a_loss() {
        let mut position = Position::new(long_setup(), now());
        // Bar spanning both the stop and the first target: stop wins
        let decision = decide_exit(&position, 84.0, 116.0);
        assert_eq!(decision, ExitDecision::StopHit { breakeven: false });

        let outcome = position.apply_decision(decision, now()).unwrap();
        assert_eq!(outcome.exit_cause, ExitCause::Stop);
        assert_eq!(outcome.result, TradeResult::Loss);
        assert!((outcome.exit_price - 85.0).abs() < 1e-9);
        assert!((outcome.pnl_points + 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_target_moves_stop_to_breakeven() {
        let mut position = Position::new(long_setup(), now());

        let decision = decide_exit(&position, 110.0, 116.0);
        assert_eq!(
            decision,
            ExitDecision::TargetHit { index: 0, is_final: false }
        );
        assert!(position.apply_decision(decision, now()).is_none());

        assert_eq!(position.status, PositionStatus::Partial);
        assert!((position.current_stop - 100.0).abs() < 1e-9);
        assert!(position.at_breakeven_or_better());

        // A pullback to 99 now exits at breakeven, not as a loss
        let decision = decide_exit(&position, 99.0, 99.0);
        assert_eq!(decision, ExitDecision::StopHit { breakeven: true });
        let outcome = position.apply_decision(decision, now()).unwrap();
        assert_eq!(outcome.result, TradeResult::Breakeven);
        assert!((outcome.exit_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_never_moves_back() {
        let mut position = Position::new(long_setup(), now());
        position.apply_decision(
            ExitDecision::TargetHit { index: 0, is_final: false },
            now(),
        );
        assert!((position.current_stop - 100.0).abs() < 1e-9);

        // A second partial must not regress the stop
        position.apply_decision(
            ExitDecision::TargetHit { index: 1, is_final: false },
            now(),
        );
        assert!((position.current_stop - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_final_target_closes_as_win() {
        let mut position = Position::new(long_setup(), now());
        position.apply_decision(ExitDecision::TargetHit { index: 0, is_final: false }, now());
        position.apply_decision(ExitDecision::TargetHit { index: 1, is_final: false }, now());

        let decision = decide_exit(&position, 130.0, 146.0);
        assert_eq!(decision, ExitDecision::TargetHit { index: 2, is_final: true });
        let outcome = position.apply_decision(decision, now()).unwrap();

        assert_eq!(outcome.exit_cause, ExitCause::FinalTarget);
        assert_eq!(outcome.result, TradeResult::Win);
        assert!((outcome.pnl_points - 45.0).abs() < 1e-9);
        assert!(position.is_closed());
    }

    #[test]
    fn test_one_transition_per_observation() {
        let position = Position::new(long_setup(), now());
        // Favorable extreme beyond T2: only T1 (lowest unhit) triggers
        let decision = decide_exit(&position, 110.0, 126.0);
        assert_eq!(
            decision,
            ExitDecision::TargetHit { index: 0, is_final: false }
        );
    }

    #[test]
    fn test_closed_position_is_inert() {
        let mut position = Position::new(long_setup(), now());
        let decision = decide_exit(&position, 84.0, 84.0);
        assert!(position.apply_decision(decision, now()).is_some());
        assert!(position.is_closed());

        // Exactly-once: further observations are no-ops
        assert_eq!(decide_exit(&position, 50.0, 200.0), ExitDecision::Hold);
        assert!(position
            .apply_decision(ExitDecision::StopHit { breakeven: false }, now())
            .is_none());
    }

    #[test]
    fn test_short_side_mirrors() {
        let mut position = Position::new(short_setup(), now());

        let decision = decide_exit(&position, 110.0, 84.0);
        assert_eq!(
            decision,
            ExitDecision::TargetHit { index: 0, is_final: false }
        );
        position.apply_decision(decision, now());
        assert!((position.current_stop - 100.0).abs() < 1e-9);

        // Adverse pop to 101 after breakeven: protected exit
        let decision = decide_exit(&position, 101.0, 101.0);
        assert_eq!(decision, ExitDecision::StopHit { breakeven: true });
    }

    #[test]
    fn test_tracker_rejects_duplicates_and_sentinel() {
        let mut tracker = PositionLifecycleTracker::new(SentinelConfig::default());

        assert!(!tracker.add(TradeSetup::no_trade(Direction::Long)));
        assert!(tracker.add(long_setup()));
        // Within the 2.0 duplicate tolerance of the open position
        let mut near = long_setup();
        near.entry = 101.0;
        assert!(!tracker.add(near));
        assert_eq!(tracker.open_positions().len(), 1);
    }

    #[test]
    fn test_tracker_evicts_oldest_beyond_cap() {
        let config = SentinelConfig {
            max_tracked_positions: 2,
            ..SentinelConfig::default()
        };
        let mut tracker = PositionLifecycleTracker::new(config);

        for i in 0..3 {
            let mut setup = long_setup();
            setup.entry = 100.0 + (i as f64) * 10.0;
            setup.stop = setup.entry - 15.0;
            assert!(tracker.add(setup));
        }

        assert_eq!(tracker.open_positions().len(), 2);
        // The oldest (entry 100) was evicted without closing
        assert!(tracker
            .open_positions()
            .iter()
            .all(|p| p.setup.entry > 105.0));
        assert!(tracker.outcomes().is_empty());
    }

    #[test]
    fn test_tracker_full_lifecycle_events() {
        let mut tracker = PositionLifecycleTracker::new(SentinelConfig::default());
        tracker.add(long_setup());

        assert!(tracker.on_price(110.0).is_empty());

        let events = tracker.on_price(116.0);
        assert_eq!(events.len(), 1);
        assert!(events[0].text.contains("TARGET 1"));
        assert!(events[0].text.contains("breakeven"));

        let events = tracker.on_price(99.0);
        assert_eq!(events.len(), 1);
        assert!(events[0].text.contains("STOP HIT"));
        assert_eq!(tracker.outcomes().len(), 1);
        assert_eq!(tracker.outcomes()[0].result, TradeResult::Breakeven);
        assert!(tracker.open_positions().is_empty());

        // Idempotent after close
        assert!(tracker.on_price(80.0).is_empty());
        assert_eq!(tracker.outcomes().len(), 1);
    }
}

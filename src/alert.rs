//! Human-readable alert text for setups and lifecycle transitions.
//!
//! Formatting only. Delivery (Telegram, webhook, stdout) is the caller's
//! concern.

use crate::setup::TradeSetup;

/// Multi-line plan summary sent when a setup is accepted for tracking
pub fn setup_summary(setup: &TradeSetup) -> String {
    if !setup.is_actionable() {
        return "No actionable setup".to_string();
    }

    let sign = setup.direction.sign();
    let mut lines = vec![
        format!(
            "TRADE SETUP {} | {} ({})",
            setup.direction,
            setup.trade_class,
            setup.trade_class.expected_duration()
        ),
        format!("Entry: {:.2}", setup.entry),
        format!(
            "Stop:  {:.2} ({:+.1} pts)",
            setup.stop,
            (setup.stop - setup.entry) * sign
        ),
    ];

    for (i, target) in setup.targets.iter().enumerate() {
        lines.push(format!(
            "T{}: {:.2} ({:+.1} pts, {:.0}% size, ~{:.0}% est)",
            i + 1,
            target.price,
            (target.price - setup.entry) * sign,
            target.size_fraction * 100.0,
            target.hit_probability
        ));
    }

    lines.push(format!(
        "Support:    {}",
        join_levels(&setup.support_levels)
    ));
    lines.push(format!(
        "Resistance: {}",
        join_levels(&setup.resistance_levels)
    ));
    lines.push(format!(
        "ATR: {:.1} pts | Risk: {:.1} pts",
        setup.volatility, setup.risk_distance
    ));

    lines.join("\n")
}

/// Stop-out event, distinguishing a protected breakeven exit from a loss
pub fn stop_hit(fill: f64, pnl_points: f64, breakeven: bool) -> String {
    if breakeven {
        format!(
            "STOP HIT @ {:.2} | {:+.1} pts | protected at breakeven",
            fill, pnl_points
        )
    } else {
        format!("STOP HIT @ {:.2} | {:+.1} pts | LOSS", fill, pnl_points)
    }
}

/// Partial exit at a non-final rung
pub fn partial_target(index: usize, fill: f64, pnl_points: f64, stop_moved_to: Option<f64>) -> String {
    match stop_moved_to {
        Some(entry) => format!(
            "TARGET {} HIT @ {:.2} | {:+.1} pts | stop moved to breakeven {:.2}",
            index + 1,
            fill,
            pnl_points,
            entry
        ),
        None => format!(
            "TARGET {} HIT @ {:.2} | {:+.1} pts",
            index + 1,
            fill,
            pnl_points
        ),
    }
}

/// Final rung reached; the plan is complete
pub fn final_target(fill: f64, pnl_points: f64) -> String {
    format!(
        "FINAL TARGET HIT @ {:.2} | {:+.1} pts | position closed",
        fill, pnl_points
    )
}

fn join_levels(levels: &[f64]) -> String {
    levels
        .iter()
        .map(|l| format!("{:.0}", l))
        .collect::<Vec<_>>()
        .join(" | ")
}

//! Swing-point support/resistance detection.
//!
//! A swing low/high is a bar strictly more extreme than its two neighbors
//! on each side. Candidates on the requested side of the reference price
//! are ranked by proximity; if fewer than three exist, round-number levels
//! are synthesized beyond the farthest one so callers always get exactly
//! three. Externally asserted levels (e.g. a desk's key-level sheet) can be
//! merged in, subject to the same side constraint.

use crate::bars::Bar;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Which side of the reference price to search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSide {
    Support,
    Resistance,
}

/// Key levels asserted by an outside source, merged into swing detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpertLevels {
    #[serde(default)]
    pub support: Vec<f64>,
    #[serde(default)]
    pub resistance: Vec<f64>,
}

impl ExpertLevels {
    /// Load from a JSON file. A missing file is the documented absent
    /// case, not an error; a present-but-malformed file is.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("no expert levels at {:?}", path);
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading expert levels {:?}", path))?;
        let levels: ExpertLevels = serde_json::from_str(&raw)
            .with_context(|| format!("parsing expert levels {:?}", path))?;
        Ok(Some(levels))
    }
}

/// Number of levels always returned
pub const LEVEL_COUNT: usize = 3;

/// Find the nearest support or resistance levels around `reference_price`.
///
/// Scans the last `lookback` bars, merges any expert levels on the correct
/// side, and pads with round-number levels at `round_step` increments.
/// Pure and deterministic; returns exactly [`LEVEL_COUNT`] entries,
/// nearest first.
pub fn find_levels(
    bars: &[Bar],
    reference_price: f64,
    lookback: usize,
    side: LevelSide,
    expert: Option<&ExpertLevels>,
    round_step: f64,
) -> Vec<f64> {
    let window = if bars.len() > lookback {
        &bars[bars.len() - lookback..]
    } else {
        bars
    };

    let mut candidates = swing_extremes(window, side);

    // Side constraint: support strictly below the reference, resistance
    // strictly above. Expert entries violating it are discarded.
    if let Some(expert) = expert {
        let asserted = match side {
            LevelSide::Support => &expert.support,
            LevelSide::Resistance => &expert.resistance,
        };
        candidates.extend(asserted.iter().copied());
    }
    candidates.retain(|&level| match side {
        LevelSide::Support => level < reference_price,
        LevelSide::Resistance => level > reference_price,
    });

    // Dedup near-equal prices before ranking by proximity
    candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    candidates.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    candidates.sort_by(|a, b| {
        (a - reference_price)
            .abs()
            .partial_cmp(&(b - reference_price).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(LEVEL_COUNT);

    // Pad with round numbers beyond the farthest level found
    let mut anchor = candidates.last().copied().unwrap_or(reference_price);
    while candidates.len() < LEVEL_COUNT {
        anchor = next_round_level(anchor, side, round_step);
        candidates.push(anchor);
    }

    candidates
}

/// Local extrema strictly more extreme than two neighbors on each side
fn swing_extremes(window: &[Bar], side: LevelSide) -> Vec<f64> {
    let mut found = Vec::new();
    if window.len() < 5 {
        return found;
    }

    for i in 2..window.len() - 2 {
        let is_swing = match side {
            LevelSide::Support => {
                let low = window[i].low;
                low < window[i - 1].low
                    && low < window[i - 2].low
                    && low < window[i + 1].low
                    && low < window[i + 2].low
            }
            LevelSide::Resistance => {
                let high = window[i].high;
                high > window[i - 1].high
                    && high > window[i - 2].high
                    && high > window[i + 1].high
                    && high > window[i + 2].high
            }
        };
        if is_swing {
            found.push(match side {
                LevelSide::Support => window[i].low,
                LevelSide::Resistance => window[i].high,
            });
        }
    }

    found
}

/// Nearest multiple of `step` strictly beyond `anchor` on the given side
fn next_round_level(anchor: f64, side: LevelSide, step: f64) -> f64 {
    match side {
        LevelSide::Support => {
            let mut level = (anchor / step).floor() * step;
            if level >= anchor {
                level -= step;
            }
            level
        }
        LevelSide::Resistance => {
            let mut level = (anchor / step).ceil() * step;
            if level <= anchor {
                level += step;
            }
            level
        }
    }
}

//! Parameter sweep over replay runs.
//!
//! Loads the series once and evaluates every parameter combination in
//! parallel with rayon. Each run owns its simulator and position state,
//! so runs cannot interfere; within a run bars stay sequential.

use anyhow::Result;
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::bars::Bar;
use crate::config::SentinelConfig;
use crate::setup::SetupCalculator;
use crate::signal::ScorePolicy;
use crate::simulator::{SimReport, Simulator};
use crate::volatility::AtrVolatility;

/// One point of the parameter grid
#[derive(Debug, Clone)]
pub struct SweepParams {
    pub stop_multiplier: f64,
    /// Scales every target risk multiple (1.0 = config defaults)
    pub target_scale: f64,
    pub entry_threshold: f64,
}

/// Replay results for one grid point
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub params: SweepParams,
    pub report: SimReport,
}

/// Cartesian product of the parameter axes
pub fn generate_combinations(
    stop_multipliers: &[f64],
    target_scales: &[f64],
    entry_thresholds: &[f64],
) -> Vec<SweepParams> {
    let mut combinations = Vec::new();
    for &stop_multiplier in stop_multipliers {
        for &target_scale in target_scales {
            for &entry_threshold in entry_thresholds {
                combinations.push(SweepParams {
                    stop_multiplier,
                    target_scale,
                    entry_threshold,
                });
            }
        }
    }
    combinations
}

fn config_for(base: &SentinelConfig, params: &SweepParams) -> SentinelConfig {
    let mut config = base.clone();
    config.stop_multiplier = params.stop_multiplier;
    config.entry_threshold = params.entry_threshold;
    config.target_risk_multiples = base
        .target_risk_multiples
        .iter()
        .map(|m| m * params.target_scale)
        .collect();
    config
}

/// Run the grid in parallel and write a CSV of per-point results
pub fn run_sweep(
    bars: &[Bar],
    base: &SentinelConfig,
    combinations: Vec<SweepParams>,
    output: &Path,
) -> Result<Vec<SweepResult>> {
    let total = combinations.len();
    println!("Running {} parameter combinations in parallel...", total);

    let completed = AtomicUsize::new(0);
    let start = std::time::Instant::now();

    let results: Vec<SweepResult> = combinations
        .into_par_iter()
        .map(|params| {
            let config = config_for(base, &params);
            let calculator = SetupCalculator::new(
                config.clone(),
                Box::new(AtrVolatility {
                    period: config.atr_period,
                }),
            );
            let policy = ScorePolicy::new(config.entry_threshold);
            let report = Simulator::new(calculator, Box::new(policy)).run(bars);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 50 == 0 || done == total {
                eprint!("\r[{}/{}]      ", done, total);
            }

            SweepResult { params, report }
        })
        .collect();

    eprintln!();

    let mut file = std::fs::File::create(output)?;
    writeln!(
        file,
        "stop_multiplier,target_scale,entry_threshold,trades,wins,losses,breakevens,win_rate,total_points,avg_points"
    )?;
    for result in &results {
        let p = &result.params;
        let r = &result.report;
        writeln!(
            file,
            "{},{},{},{},{},{},{},{:.2},{:.2},{:.2}",
            p.stop_multiplier,
            p.target_scale,
            p.entry_threshold,
            r.trade_count,
            r.wins,
            r.losses,
            r.breakevens,
            r.win_rate,
            r.total_points,
            r.avg_points
        )?;
    }
    println!("Results written to {:?}", output);

    // Leaderboard by total points among grid points that actually traded
    let mut ranked: Vec<&SweepResult> = results
        .iter()
        .filter(|r| r.report.trade_count > 0)
        .collect();
    ranked.sort_by(|a, b| {
        b.report
            .total_points
            .partial_cmp(&a.report.total_points)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    println!("\n=== SWEEP SUMMARY ===");
    println!("Total combinations: {}", total);
    println!("Traded combinations: {}", ranked.len());
    for (i, r) in ranked.iter().take(10).enumerate() {
        println!(
            "  {}. P&L={:+.1} pts Trades={} WR={:.1}% | stop={} scale={} thr={}",
            i + 1,
            r.report.total_points,
            r.report.trade_count,
            r.report.win_rate,
            r.params.stop_multiplier,
            r.params.target_scale,
            r.params.entry_threshold
        );
    }
    println!(
        "Completed in {:.1}s",
        start.elapsed().as_secs_f64()
    );

    Ok(results)
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use trade_sentinel::{
    alert, bars, sweep, AtrVolatility, CsvTailSource, Direction, ExpertLevels, EntryPolicy,
    PositionLifecycleTracker, ScorePolicy, SentinelConfig, SetupCalculator, SimReport, Simulator,
    TradeJournal,
};

#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(about = "ATR-scaled trade plans, live tracking and replay for NQ futures")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute a trade plan from the latest bar of a series
    Setup {
        /// Bar series CSV (timestamp,open,high,low,close,volume)
        #[arg(short, long)]
        bars: PathBuf,

        /// Force a direction (long/short) instead of the score policy
        #[arg(short, long)]
        direction: Option<String>,

        /// Confidence in [0,1] when forcing a direction
        #[arg(short, long, default_value_t = 0.75)]
        confidence: f64,

        /// JSON file with externally asserted key levels
        #[arg(short, long)]
        expert: Option<PathBuf>,

        /// Score threshold for the entry policy
        #[arg(short, long, default_value_t = 60.0)]
        threshold: f64,
    },

    /// Replay the strategy over a historical series
    Backtest {
        #[arg(short, long)]
        bars: PathBuf,

        /// Score threshold for the entry policy
        #[arg(short, long, default_value_t = 60.0)]
        threshold: f64,

        /// Stop distance as a multiple of ATR
        #[arg(short, long, default_value_t = 1.5)]
        stop_multiplier: f64,

        /// Forced time exit after this many bars
        #[arg(short, long, default_value_t = 48)]
        max_holding_bars: usize,

        /// Append closed trades to this journal CSV
        #[arg(short, long)]
        journal: Option<PathBuf>,
    },

    /// Grid-search stop multiplier, target scale and entry threshold
    Sweep {
        #[arg(short, long)]
        bars: PathBuf,

        /// Output CSV for per-combination results
        #[arg(short, long, default_value = "sweep_results.csv")]
        output: PathBuf,

        /// Stop multipliers to test
        #[arg(long, value_delimiter = ',', default_value = "1.0,1.5,2.0")]
        stop_multipliers: Vec<f64>,

        /// Target ladder scales to test
        #[arg(long, value_delimiter = ',', default_value = "0.75,1.0,1.25")]
        target_scales: Vec<f64>,

        /// Entry thresholds to test
        #[arg(long, value_delimiter = ',', default_value = "55,60,65")]
        thresholds: Vec<f64>,
    },

    /// Track a fresh plan live against a polled quote
    Monitor {
        /// Bar series CSV, kept current by the upstream fetcher
        #[arg(short, long)]
        bars: PathBuf,

        /// Seconds between price checks
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Journal CSV for closed trades
        #[arg(short, long, default_value = "data/trade_history.csv")]
        journal: PathBuf,

        /// Force a direction (long/short) instead of the score policy
        #[arg(short, long)]
        direction: Option<String>,

        /// Confidence in [0,1] when forcing a direction
        #[arg(short, long, default_value_t = 0.75)]
        confidence: f64,

        /// JSON file with externally asserted key levels
        #[arg(short, long)]
        expert: Option<PathBuf>,

        /// Score threshold for the entry policy
        #[arg(short, long, default_value_t = 60.0)]
        threshold: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Setup {
            bars,
            direction,
            confidence,
            expert,
            threshold,
        } => cmd_setup(bars, direction, confidence, expert, threshold),

        Commands::Backtest {
            bars,
            threshold,
            stop_multiplier,
            max_holding_bars,
            journal,
        } => cmd_backtest(bars, threshold, stop_multiplier, max_holding_bars, journal),

        Commands::Sweep {
            bars,
            output,
            stop_multipliers,
            target_scales,
            thresholds,
        } => cmd_sweep(bars, output, stop_multipliers, target_scales, thresholds),

        Commands::Monitor {
            bars,
            interval,
            journal,
            direction,
            confidence,
            expert,
            threshold,
        } => {
            cmd_monitor(
                bars, interval, journal, direction, confidence, expert, threshold,
            )
            .await
        }
    }
}

fn parse_direction(raw: &str) -> Result<Direction> {
    match raw.to_lowercase().as_str() {
        "long" | "buy" => Ok(Direction::Long),
        "short" | "sell" => Ok(Direction::Short),
        other => bail!("unknown direction '{}', expected long or short", other),
    }
}

/// Resolve direction and confidence: forced by flag, or from the score
/// policy on the latest bar
fn resolve_signal(
    series: &[trade_sentinel::Bar],
    direction: Option<String>,
    confidence: f64,
    threshold: f64,
) -> Result<Option<(Direction, f64)>> {
    if let Some(raw) = direction {
        return Ok(Some((parse_direction(&raw)?, confidence.clamp(0.0, 1.0))));
    }
    if series.is_empty() {
        return Ok(None);
    }
    let policy = ScorePolicy::new(threshold);
    Ok(policy
        .evaluate(series, series.len() - 1)
        .map(|s| (s.direction, s.confidence)))
}

fn calculator_with(config: SentinelConfig, expert: Option<PathBuf>) -> Result<SetupCalculator> {
    let expert = match expert {
        Some(path) => ExpertLevels::load(&path)?,
        None => None,
    };
    let atr = AtrVolatility {
        period: config.atr_period,
    };
    Ok(SetupCalculator::new(config, Box::new(atr)).with_expert_levels(expert))
}

fn cmd_setup(
    bars_path: PathBuf,
    direction: Option<String>,
    confidence: f64,
    expert: Option<PathBuf>,
    threshold: f64,
) -> Result<()> {
    let series = bars::load_bars(&bars_path)?;
    info!("loaded {} bars from {:?}", series.len(), bars_path);

    let Some((direction, confidence)) = resolve_signal(&series, direction, confidence, threshold)?
    else {
        println!("No entry signal on the latest bar (score in the neutral band).");
        return Ok(());
    };

    let config = SentinelConfig {
        entry_threshold: threshold,
        ..SentinelConfig::default()
    };
    let calculator = calculator_with(config, expert)?;
    let setup = calculator.build(&series, direction, confidence);

    println!("{}", alert::setup_summary(&setup));
    Ok(())
}

fn cmd_backtest(
    bars_path: PathBuf,
    threshold: f64,
    stop_multiplier: f64,
    max_holding_bars: usize,
    journal: Option<PathBuf>,
) -> Result<()> {
    let series = bars::load_bars(&bars_path)?;
    info!("loaded {} bars from {:?}", series.len(), bars_path);

    let config = SentinelConfig {
        entry_threshold: threshold,
        stop_multiplier,
        max_holding_bars,
        ..SentinelConfig::default()
    };
    let calculator = calculator_with(config.clone(), None)?;
    let policy = ScorePolicy::new(config.entry_threshold);
    let report = Simulator::new(calculator, Box::new(policy)).run(&series);

    if let Some(path) = journal {
        let journal = TradeJournal::new(path)?;
        for outcome in &report.outcomes {
            journal.append(outcome)?;
        }
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &SimReport) {
    println!("\n═══════════════════════════════════════");
    println!("          BACKTEST RESULTS");
    println!("═══════════════════════════════════════\n");
    println!("Total Trades: {}", report.trade_count);
    println!(
        "Wins:         {} ({:.1}%)",
        report.wins, report.win_rate
    );
    println!("Losses:       {}", report.losses);
    println!("Breakevens:   {}", report.breakevens);
    println!("Total P&L:    {:+.2} pts", report.total_points);
    println!("Avg Trade:    {:+.2} pts", report.avg_points);
    println!("\n═══════════════════════════════════════\n");
}

fn cmd_sweep(
    bars_path: PathBuf,
    output: PathBuf,
    stop_multipliers: Vec<f64>,
    target_scales: Vec<f64>,
    thresholds: Vec<f64>,
) -> Result<()> {
    let series = bars::load_bars(&bars_path)?;
    info!("loaded {} bars from {:?}", series.len(), bars_path);

    let combinations = sweep::generate_combinations(&stop_multipliers, &target_scales, &thresholds);
    if combinations.is_empty() {
        bail!("empty parameter grid");
    }

    sweep::run_sweep(&series, &SentinelConfig::default(), combinations, &output)?;
    Ok(())
}

async fn cmd_monitor(
    bars_path: PathBuf,
    interval: u64,
    journal_path: PathBuf,
    direction: Option<String>,
    confidence: f64,
    expert: Option<PathBuf>,
    threshold: f64,
) -> Result<()> {
    let series = bars::load_bars(&bars_path)?;
    info!("loaded {} bars from {:?}", series.len(), bars_path);

    let Some((direction, confidence)) = resolve_signal(&series, direction, confidence, threshold)?
    else {
        println!("No entry signal on the latest bar; nothing to monitor.");
        return Ok(());
    };

    let config = SentinelConfig {
        entry_threshold: threshold,
        ..SentinelConfig::default()
    };
    let calculator = calculator_with(config.clone(), expert)?;
    let setup = calculator.build(&series, direction, confidence);
    if !setup.is_actionable() {
        println!("No actionable setup (degenerate volatility or short series).");
        return Ok(());
    }

    println!("{}\n", alert::setup_summary(&setup));

    let journal = TradeJournal::new(journal_path)?;
    let mut tracker = PositionLifecycleTracker::new(config).with_journal(journal);
    if !tracker.add(setup) {
        bail!("tracker rejected the setup");
    }

    trade_sentinel::monitor::run_monitor(tracker, CsvTailSource::new(bars_path), interval).await
}

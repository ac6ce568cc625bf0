// Library crate - trade plan computation, lifecycle tracking and replay

pub mod alert;
pub mod bars;
pub mod config;
pub mod journal;
pub mod levels;
pub mod lifecycle;
pub mod monitor;
pub mod setup;
pub mod signal;
pub mod simulator;
pub mod sweep;
pub mod volatility;

// Re-export commonly used types
pub use bars::Bar;
pub use config::SentinelConfig;
pub use journal::TradeJournal;
pub use levels::{ExpertLevels, LevelSide};
pub use lifecycle::{
    decide_exit, ExitCause, ExitDecision, LifecycleEvent, Position, PositionLifecycleTracker,
    PositionStatus, TradeOutcome, TradeResult,
};
pub use monitor::{CsvTailSource, QuoteSource};
pub use setup::{Direction, SetupCalculator, Target, TradeClass, TradeSetup};
pub use signal::{EntryPolicy, EntrySignal, ScorePolicy};
pub use simulator::{SimReport, Simulator};
pub use volatility::{AtrVolatility, NoVolatility, VolatilitySource};

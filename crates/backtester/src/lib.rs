//! Backtester
//!
//! Historical simulation of rule-based futures strategies.
//!
//! # Features
//!
//! - **Candle Store**: Populate-once store of per-contract minute candles with hourly bucketing
//! - **Signal Analyzers**: SMA/RSI trend filter built on the `ta` indicators
//! - **Trade Simulators**: Single-instrument and contract-rollover simulators with cost models
//! - **Evaluator & Aggregator**: Ledger metrics, recomputed over the union of runs per strategy
//! - **Runner**: Full-range and sliding-window execution over one or many contracts
//!
//! # Example
//!
//! ```ignore
//! use backtester::{
//!     BacktestRunner, CandleStore, RunnerConfig, SimulatorConfig,
//!     SimulatorKind, SmaRsiParams, Strategy,
//! };
//!
//! let store = CandleStore::load_dir(Path::new("data/candles_filtered"))?;
//! let strategy = Strategy::sma_rsi(
//!     SmaRsiParams::default(),
//!     SimulatorKind::basic(SimulatorConfig::default()),
//! )?;
//!
//! let runner = BacktestRunner::new(RunnerConfig::default());
//! let results = runner.run_with_provider(&strategy, &store)?;
//! let ranked = aggregate_by_strategy(&results);
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod data_store;
pub mod evaluator;
pub mod rollover;
pub mod runner;
pub mod simulator;
pub mod strategy;

// Re-exports
pub use aggregator::{aggregate_by_strategy, rank_by_pnl};
pub use analyzer::{AnalyzedBar, SignalAnalyzer, SmaRsiAnalyzer, SmaRsiParams};
pub use data_store::{
    aggregate_hourly, contract_code_from_source, stitch_contracts, CandleProvider,
    CandleQuery, CandleStore, MINUTE_FILE_SUFFIX,
};
pub use evaluator::evaluate;
pub use rollover::{RolloverSchedule, RolloverSimulator};
pub use runner::{
    generate_windows, BacktestRunner, BacktestWindow, DataSource, RunnerConfig, ROLL_COMBINED,
};
pub use simulator::{
    BasicSimulator, OpenPosition, Simulation, SimulatorConfig, SimulatorKind, TradeSimulator,
};
pub use strategy::{Strategy, StrategyRun};

//! Futures Backtest: rule-based futures strategy backtesting with contract rollover
//!
//! This is the root crate that provides benchmark and integration test access to the
//! internal crates. For actual functionality, use the individual crates directly:
//!
//! - `backtest-core`: Candle, signal, trade and result types, errors, sweep configuration
//! - `backtester`: Candle store, analyzers, simulators, evaluator, aggregator, runner
//! - `sweep`: Parallel parameter sweep binary with JSON reports

// Re-export for benchmarks
pub use backtest_core as core;
pub use backtester as engine;

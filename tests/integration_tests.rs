//! Integration tests for component interactions.
//!
//! These tests verify that the store, analyzer, simulators, runner and
//! aggregator work together correctly.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use backtest_core::config::{SweepConfig, Timeframe};
use backtest_core::types::{Bar, CandleRecord, ExitReason, Metrics, Signal, StrategyResult};
use backtester::{
    aggregate_by_strategy, evaluate, BacktestRunner, CandleProvider, CandleQuery, CandleStore,
    RunnerConfig, SimulatorConfig, SimulatorKind, SmaRsiParams, Strategy, TradeSimulator,
    ROLL_COMBINED,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Quarter-hour records with an oscillating price, starting `start_day` days after t0.
fn oscillating_records(start_day: i64, days: i64, base: i64) -> Vec<CandleRecord> {
    let count = days * 24 * 4;
    (0..count)
        .map(|i| {
            // 8-hour triangle wave
            let phase = (i / 4) % 16;
            let offset = if phase < 8 { phase } else { 16 - phase };
            let price = Decimal::new(base + offset * 5, 0);
            CandleRecord {
                datetime: t0() + Duration::days(start_day) + Duration::minutes(i * 15),
                open: Some(price),
                high: Some(price + Decimal::ONE),
                low: Some(price - Decimal::ONE),
                close: Some(price),
                volume: Some(Decimal::TEN),
            }
        })
        .collect()
}

fn hourly_bars(opens: &[i64]) -> Vec<Bar> {
    opens
        .iter()
        .enumerate()
        .map(|(i, open)| {
            let p = Decimal::new(*open, 0);
            Bar::new(t0() + Duration::hours(i as i64), p, p, p, p)
        })
        .collect()
}

fn signals(values: &[i8]) -> Vec<Signal> {
    values.iter().map(|v| Signal::try_from(*v).unwrap()).collect()
}

fn params() -> SmaRsiParams {
    SmaRsiParams {
        sma_period: 5,
        rsi_period: 5,
        atr_period: 5,
        rsi_buy: 55,
        rsi_sell: 45,
    }
}

struct TempDataDir(PathBuf);

impl TempDataDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("futures_backtest_{name}_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn write_contract(&self, code: &str, records: &[CandleRecord]) {
        let path = self.0.join(format!("{code}_candle_interval_minute.json"));
        fs::write(path, serde_json::to_string(records).unwrap()).unwrap();
    }
}

impl Drop for TempDataDir {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.0).ok();
    }
}

/// Two overlapping contracts: A covers days 0-10, B covers days 8-20.
fn two_contract_store(name: &str) -> (TempDataDir, CandleStore) {
    let dir = TempDataDir::new(name);
    dir.write_contract("FUTA032024", &oscillating_records(0, 10, 1_000));
    dir.write_contract("FUTB062024", &oscillating_records(8, 12, 1_100));
    let store = CandleStore::load_dir(&dir.0).unwrap();
    (dir, store)
}

/// Test the lag scenario on open prices [100..104].
#[test]
fn test_lagged_execution_scenario() {
    let simulator = SimulatorKind::basic(SimulatorConfig::frictionless());
    let bars = hourly_bars(&[100, 101, 102, 103, 104]);

    let single = simulator.simulate(&bars, &signals(&[0, 1, 0, 0, 0]));
    assert_eq!(single.trades.len(), 1);
    assert_eq!(single.trades[0].entry_price, dec!(102));
    assert_eq!(single.trades[0].exit_price, dec!(103));
    assert_eq!(single.trades[0].pnl_raw, dec!(1));

    let held = simulator.simulate(&bars, &signals(&[0, 1, 1, 0, 0]));
    assert_eq!(held.trades.len(), 1);
    assert_eq!(held.trades[0].entry_price, dec!(102));
    assert_eq!(held.trades[0].exit_price, dec!(104));
}

/// Test cost application on a single round trip.
#[test]
fn test_cost_model() {
    let simulator = SimulatorKind::basic(SimulatorConfig::new(dec!(0.0004), dec!(10)));
    let bars = hourly_bars(&[90, 100, 105, 110]);

    let sim = simulator.simulate(&bars, &signals(&[1, 1, 0, 0]));
    let trade = &sim.trades[0];

    assert_eq!(trade.entry_price, dec!(100));
    assert_eq!(trade.exit_price, dec!(110));
    assert_eq!(trade.commission, dec!(0.084));
    assert_eq!(trade.slippage, dec!(20));
    assert_eq!(trade.pnl_net, dec!(-10.084));
}

/// Test that an all-flat signal series produces the empty metric set.
#[test]
fn test_no_signal_empty_metrics() {
    let bars = hourly_bars(&[100, 101, 102, 103]);
    for simulator in [
        SimulatorKind::basic(SimulatorConfig::default()),
        SimulatorKind::rollover(SimulatorConfig::default(), Duration::hours(24)),
    ] {
        let sim = simulator.simulate(&bars, &signals(&[0, 0, 0, 0]));
        assert!(sim.trades.is_empty());
        assert_eq!(evaluate(&sim.trades), Metrics::empty());
    }
}

/// Test loading files, hourly bucketing and per-ticker full-range runs.
#[test]
fn test_store_to_runner_per_ticker() {
    let (_dir, store) = two_contract_store("per_ticker");
    assert_eq!(store.available_tickers(), vec!["FUTA032024", "FUTB062024"]);

    let hourly = store.hourly_candles(&CandleQuery::all().ticker("FUTA032024")).unwrap();
    assert_eq!(hourly.len(), 10 * 24);
    assert!(hourly.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    let runner = BacktestRunner::new(RunnerConfig {
        timeframe: Timeframe::Hour,
        ..RunnerConfig::default()
    });
    let strategy = Strategy::sma_rsi(params(), SimulatorKind::basic(SimulatorConfig::default())).unwrap();
    let results = runner.run_with_provider(&strategy, &store).unwrap();

    let labels: Vec<&str> = results.iter().map(|r| r.contract_label.as_str()).collect();
    assert_eq!(labels, vec!["FUTA032024 (full)", "FUTB062024 (full)"]);
    for result in &results {
        assert_eq!(result.strategy_id, "SMARSI_sma5_rsi5_atr5_buy55_sell45");
        assert!(result.metrics.trades > 0);
        assert_eq!(result.metrics, evaluate(&result.trades));
    }
}

/// Test that rollover trades stay within each contract's own bar range.
#[test]
fn test_rollover_boundary() {
    let (_dir, store) = two_contract_store("rollover");
    let ranges: HashMap<String, (DateTime<Utc>, DateTime<Utc>)> = store
        .available_tickers()
        .into_iter()
        .map(|code| {
            let bars = store.hourly_candles(&CandleQuery::all().ticker(code.clone())).unwrap();
            let range = (bars[0].timestamp, bars[bars.len() - 1].timestamp);
            (code, range)
        })
        .collect();

    let runner = BacktestRunner::new(RunnerConfig {
        timeframe: Timeframe::Hour,
        rollover: true,
        ..RunnerConfig::default()
    });
    let strategy = Strategy::sma_rsi(
        params(),
        SimulatorKind::rollover(SimulatorConfig::default(), Duration::hours(24)),
    )
    .unwrap();

    let sources = runner.load_sources(&store).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, ROLL_COMBINED);

    let results = runner.run(&strategy, &sources);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].contract_label, "ROLL (full)");

    let trades = &results[0].trades;
    assert!(!trades.is_empty());
    for trade in trades {
        let code = trade.contract_code.as_deref().unwrap();
        let (first, last) = ranges[code];
        assert!(trade.entry_time >= first && trade.exit_time <= last, "{trade:?}");
    }

    // one contract switch, so at most one rollover exit
    let rollovers = trades.iter().filter(|t| t.exit_reason == ExitReason::Rollover).count();
    assert!(rollovers <= 1);

    let codes: Vec<&str> = trades.iter().filter_map(|t| t.contract_code.as_deref()).collect();
    assert!(codes.contains(&"FUTA032024"));
    assert!(codes.contains(&"FUTB062024"));
}

/// Test sliding windows and aggregation over their union.
#[test]
fn test_windows_then_aggregate() {
    let (_dir, store) = two_contract_store("windows");
    let runner = BacktestRunner::new(RunnerConfig {
        timeframe: Timeframe::Hour,
        window_days: Some(4),
        stride_days: Some(2),
        tickers: vec!["FUTB062024".to_string()],
        ..RunnerConfig::default()
    });

    let strategies: Vec<_> = [(55, 45), (60, 40)]
        .into_iter()
        .map(|(buy, sell)| {
            let p = SmaRsiParams {
                rsi_buy: buy,
                rsi_sell: sell,
                ..params()
            };
            Strategy::sma_rsi(p, SimulatorKind::basic(SimulatorConfig::default())).unwrap()
        })
        .collect();

    let mut results: Vec<StrategyResult> = Vec::new();
    for strategy in &strategies {
        results.extend(runner.run_with_provider(strategy, &store).unwrap());
    }

    // 12 days of B, last bar at day 19 23:00: windows start at days 8, 10, 12, 14
    let first_strategy: Vec<&StrategyResult> = results
        .iter()
        .filter(|r| r.strategy_id == strategies[0].strategy_id())
        .collect();
    assert_eq!(first_strategy.len(), 4);
    assert_eq!(first_strategy[0].contract_label, "FUTB062024 (2024-01-09 → 2024-01-13)");

    let aggregated = aggregate_by_strategy(&results);
    assert_eq!(aggregated.len(), 2);
    for agg in &aggregated {
        let union: Vec<_> = results
            .iter()
            .filter(|r| r.strategy_id == agg.strategy_id)
            .flat_map(|r| r.trades.iter().cloned())
            .collect();
        assert_eq!(agg.runs, 4);
        assert_eq!(agg.metrics, evaluate(&union));
    }
}

/// Test that identical inputs produce identical ledgers.
#[test]
fn test_determinism() {
    let (_dir, store) = two_contract_store("determinism");
    let runner = BacktestRunner::new(RunnerConfig {
        timeframe: Timeframe::Minute,
        rollover: true,
        ..RunnerConfig::default()
    });
    let strategy = Strategy::sma_rsi(
        params(),
        SimulatorKind::rollover(SimulatorConfig::default(), Duration::hours(24)),
    )
    .unwrap();

    let first = runner.run_with_provider(&strategy, &store).unwrap();
    let second = runner.run_with_provider(&strategy, &store).unwrap();

    assert_eq!(
        serde_json::to_string(&first[0].trades).unwrap(),
        serde_json::to_string(&second[0].trades).unwrap()
    );
}

/// Test that sweep configuration flows into the runner.
#[test]
fn test_config_to_runner() {
    let config = SweepConfig::from_toml_str(
        r#"
        timeframe = "hour"
        window_days = 30
        exclude_days_start = 2
        rollover = true
        tickers = ["FUTA032024"]
        "#,
    )
    .unwrap();

    let runner_config = RunnerConfig::from(&config);
    assert_eq!(runner_config.window_days, Some(30));
    assert_eq!(runner_config.stride_days, None);
    assert_eq!(runner_config.exclude_days_start, 2);
    assert_eq!(runner_config.timeframe, Timeframe::Hour);
    assert!(runner_config.rollover);
    assert_eq!(runner_config.tickers, vec!["FUTA032024"]);
}

//! Parameter Sweep
//!
//! Backtests every SMA/RSI combination of the configured grid over the candle
//! files in the data directory and writes ranked JSON reports.

mod grid;
mod pool;
mod report;

use anyhow::{Context, Result};
use backtest_core::config::{SweepConfig, SweepMode, Timeframe};
use backtester::{
    aggregate_by_strategy, rank_by_pnl, BacktestRunner, CandleStore, RunnerConfig, SimulatorConfig,
    SimulatorKind, Strategy,
};
use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::grid::{build_jobs, SweepJob};
use crate::pool::run_pool;
use crate::report::{ReportContext, SweepReport};

const DEFAULT_LOG_FILTER: &str = "sweep=info,backtester=info,backtest_core=warn";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Debug,
    Full,
    Exhaustive,
}

impl From<ModeArg> for SweepMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Debug => SweepMode::Debug,
            ModeArg::Full => SweepMode::Full,
            ModeArg::Exhaustive => SweepMode::Exhaustive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TimeframeArg {
    Minute,
    Hour,
}

impl From<TimeframeArg> for Timeframe {
    fn from(timeframe: TimeframeArg) -> Self {
        match timeframe {
            TimeframeArg::Minute => Timeframe::Minute,
            TimeframeArg::Hour => Timeframe::Hour,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sweep")]
#[command(about = "SMA/RSI parameter sweep over futures candle data", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parameter grid preset
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Directory with <CONTRACT>_candle_interval_minute.json files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Report output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    timeframe: Option<TimeframeArg>,

    /// Comma-separated contract codes
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<String>,

    #[arg(long)]
    window_days: Option<i64>,

    #[arg(long)]
    stride_days: Option<i64>,

    #[arg(long)]
    max_workers: Option<usize>,

    /// Stitch contracts into one instrument and roll positions across expiries
    #[arg(long)]
    rollover: bool,

    /// Write per-strategy trade ledgers
    #[arg(long)]
    save_trades: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut SweepConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(timeframe) = self.timeframe {
            config.timeframe = timeframe.into();
        }
        if !self.tickers.is_empty() {
            config.tickers = self.tickers.clone();
        }
        if self.window_days.is_some() {
            config.window_days = self.window_days;
        }
        if self.stride_days.is_some() {
            config.stride_days = self.stride_days;
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = workers;
        }
        config.rollover |= self.rollover;
        config.save_individual_reports |= self.save_trades;
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn simulator_for(config: &SweepConfig) -> SimulatorKind {
    let costs = SimulatorConfig::new(config.commission_rate, config.slippage);
    if config.rollover {
        SimulatorKind::rollover(costs, Duration::hours(config.rollover_lookback_hours))
    } else {
        SimulatorKind::basic(costs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = SweepConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    info!(
        mode = ?config.mode,
        data_dir = %config.data_dir.display(),
        rollover = config.rollover,
        window_days = ?config.window_days,
        "Starting parameter sweep"
    );
    let started_at = Utc::now();

    let data_dir = config.data_dir.clone();
    let store = Arc::new(
        tokio::task::spawn_blocking(move || CandleStore::load_dir(&data_dir))
            .await
            .context("Candle loading task failed")??,
    );

    let runner = BacktestRunner::new(RunnerConfig::from(&config));
    let sources = Arc::new(runner.load_sources(store.as_ref())?);
    if sources.is_empty() {
        warn!("No data sources to backtest");
        return Ok(());
    }

    let jobs = build_jobs(&config.parameter_grid(), config.atr_period);
    let job_count = jobs.len();
    if jobs.is_empty() {
        warn!("Parameter grid produced no valid combinations");
        return Ok(());
    }

    let simulator = simulator_for(&config);
    let summary = run_pool(jobs, config.max_workers, move |job: &SweepJob| {
        let strategy = Strategy::sma_rsi(job.params, simulator.clone())?;
        Ok(runner.run(&strategy, &sources))
    })
    .await;

    let reports = ReportContext::create(&config.output_dir)?;
    let save_trades = config.individual_reports();
    for done in &summary.completed {
        let strategy_id = done.job.strategy_id();
        reports.write_summary(&strategy_id, &done.output)?;
        if save_trades {
            reports.write_trades(&strategy_id, &done.output)?;
        }
    }

    let all_results: Vec<_> = summary
        .completed
        .iter()
        .flat_map(|done| done.output.iter().cloned())
        .collect();
    let mut ranked = aggregate_by_strategy(&all_results);
    rank_by_pnl(&mut ranked);
    reports.write_strategies(&ranked)?;

    reports.write_sweep_report(&SweepReport {
        mode: format!("{:?}", config.mode).to_lowercase(),
        jobs: job_count,
        completed: summary.completed_count(),
        failed: summary.failed,
        strategies: ranked.len(),
        started_at,
        finished_at: Utc::now(),
    })?;

    if let Some(best) = ranked.first() {
        info!(
            strategy = %best.strategy_id,
            pnl_net = %best.metrics.pnl_net,
            trades = best.metrics.trades,
            "Best strategy"
        );
    }
    info!(
        completed = summary.completed_count(),
        failed = summary.failed,
        output_dir = %reports.output_dir().display(),
        "Sweep finished"
    );

    Ok(())
}

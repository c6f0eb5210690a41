//! Backtest runner: full-range and sliding-window execution over data sources.

use anyhow::{Context, Result};
use backtest_core::config::{SweepConfig, Timeframe};
use backtest_core::types::{Bar, StrategyResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::analyzer::SignalAnalyzer;
use crate::data_store::{contract_code_from_source, CandleProvider, CandleQuery};
use crate::rollover::contract_last_bars;
use crate::strategy::Strategy;

/// Source name of the stitched multi-contract series.
pub const ROLL_COMBINED: &str = "ROLL_COMBINED";

/// A named, timestamp-ordered bar series.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub name: String,
    pub bars: Vec<Bar>,
    /// Last bar time of each contract over the whole series.
    last_bars: HashMap<String, DateTime<Utc>>,
}

impl DataSource {
    pub fn new(name: impl Into<String>, bars: Vec<Bar>) -> Self {
        let last_bars = contract_last_bars(&bars);
        Self {
            name: name.into(),
            bars,
            last_bars,
        }
    }

    pub fn contract_last_bars(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.last_bars
    }

    /// Label prefix: the name up to the first `_`.
    pub fn prefix(&self) -> String {
        contract_code_from_source(&self.name)
    }

    /// Bars with `start <= timestamp < end`.
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp < start);
        let hi = self.bars.partition_point(|b| b.timestamp < end);
        &self.bars[lo..hi.max(lo)]
    }
}

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BacktestWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn label(&self, prefix: &str) -> String {
        format!(
            "{prefix} ({} → {})",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Windows `[start + k*stride, start + k*stride + window)` that fit inside `[start, end]`.
pub fn generate_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window: Duration,
    stride: Duration,
) -> Vec<BacktestWindow> {
    if window <= Duration::zero() || stride <= Duration::zero() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut current = start;
    while current + window <= end {
        windows.push(BacktestWindow::new(current, current + window));
        current += stride;
    }
    windows
}

/// Runner settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Sliding window width in days. `None` runs the full range.
    pub window_days: Option<i64>,
    /// Defaults to `window_days`.
    pub stride_days: Option<i64>,
    pub exclude_days_start: i64,
    pub exclude_days_end: i64,
    pub timeframe: Timeframe,
    /// Treat all tickers as one stitched instrument.
    pub rollover: bool,
    /// Empty means every available ticker.
    pub tickers: Vec<String>,
}

impl From<&SweepConfig> for RunnerConfig {
    fn from(config: &SweepConfig) -> Self {
        Self {
            window_days: config.window_days,
            stride_days: config.stride_days,
            exclude_days_start: config.exclude_days_start,
            exclude_days_end: config.exclude_days_end,
            timeframe: config.timeframe,
            rollover: config.rollover,
            tickers: config.tickers.clone(),
        }
    }
}

/// Runs strategies over data sources and collects [`StrategyResult`]s.
#[derive(Debug, Clone, Default)]
pub struct BacktestRunner {
    config: RunnerConfig,
}

impl BacktestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Fetch the series to test: one per ticker, or a single stitched series
    /// in rollover mode. Tickers without data or with unreadable data are skipped.
    pub fn load_sources(&self, provider: &dyn CandleProvider) -> Result<Vec<DataSource>> {
        if self.config.rollover {
            let query = CandleQuery::all().tickers(self.config.tickers.clone());
            let bars = self
                .fetch(provider, &query)
                .context("Failed to load stitched contract series")?;

            if bars.is_empty() {
                warn!(tickers = ?self.config.tickers, "No candle data for rollover series");
                return Ok(Vec::new());
            }

            info!(source = ROLL_COMBINED, bars = bars.len(), "Loaded stitched series");
            return Ok(vec![DataSource::new(ROLL_COMBINED, bars)]);
        }

        let tickers = if self.config.tickers.is_empty() {
            provider.available_tickers()
        } else {
            self.config.tickers.clone()
        };

        let mut sources = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let query = CandleQuery::all().ticker(ticker.clone());
            let bars = match self.fetch(provider, &query) {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Failed to load candles for ticker, skipping");
                    continue;
                }
            };

            if bars.is_empty() {
                warn!(ticker = %ticker, "No candle data for ticker, skipping");
                continue;
            }

            info!(source = %ticker, bars = bars.len(), "Loaded series");
            sources.push(DataSource::new(ticker, bars));
        }

        Ok(sources)
    }

    fn fetch(&self, provider: &dyn CandleProvider, query: &CandleQuery) -> backtest_core::Result<Vec<Bar>> {
        match self.config.timeframe {
            Timeframe::Minute => provider.minute_candles(query),
            Timeframe::Hour => provider.hourly_candles(query),
        }
    }

    /// Run `strategy` over every source.
    pub fn run<A: SignalAnalyzer>(&self, strategy: &Strategy<A>, sources: &[DataSource]) -> Vec<StrategyResult> {
        let strategy_id = strategy.strategy_id();
        let mut results = Vec::new();

        for source in sources {
            let (Some(first), Some(last)) = (source.bars.first(), source.bars.last()) else {
                warn!(source = %source.name, "Empty data source, skipping");
                continue;
            };

            let start = first.timestamp + Duration::days(self.config.exclude_days_start);
            let end = last.timestamp - Duration::days(self.config.exclude_days_end);
            if start > end {
                warn!(
                    source = %source.name,
                    %start,
                    %end,
                    "Exclusions leave no data, skipping"
                );
                continue;
            }

            match self.config.window_days {
                Some(window_days) => {
                    let stride_days = self.config.stride_days.unwrap_or(window_days);
                    let windows = generate_windows(
                        start,
                        end,
                        Duration::days(window_days),
                        Duration::days(stride_days),
                    );
                    self.run_windows(strategy, &strategy_id, source, &windows, &mut results);
                }
                None => {
                    // Inclusive end: the last bar belongs to the full range.
                    let bars = source.slice(start, end + Duration::nanoseconds(1));
                    let label = format!("{} (full)", source.prefix());
                    results.push(self.make_result(strategy, &strategy_id, source, label, bars, start, end));
                }
            }
        }

        debug!(strategy = %strategy_id, results = results.len(), "Runner finished");
        results
    }

    /// Load sources from `provider` and run `strategy` over them.
    pub fn run_with_provider<A: SignalAnalyzer>(
        &self,
        strategy: &Strategy<A>,
        provider: &dyn CandleProvider,
    ) -> Result<Vec<StrategyResult>> {
        let sources = self.load_sources(provider)?;
        Ok(self.run(strategy, &sources))
    }

    fn run_windows<A: SignalAnalyzer>(
        &self,
        strategy: &Strategy<A>,
        strategy_id: &str,
        source: &DataSource,
        windows: &[BacktestWindow],
        results: &mut Vec<StrategyResult>,
    ) {
        let prefix = source.prefix();
        for window in windows {
            let bars = source.slice(window.start, window.end);
            if bars.is_empty() {
                debug!(source = %source.name, start = %window.start, "Window has no bars, skipping");
                continue;
            }

            results.push(self.make_result(
                strategy,
                strategy_id,
                source,
                window.label(&prefix),
                bars,
                window.start,
                window.end,
            ));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn make_result<A: SignalAnalyzer>(
        &self,
        strategy: &Strategy<A>,
        strategy_id: &str,
        source: &DataSource,
        label: String,
        bars: &[Bar],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StrategyResult {
        // Rollover eligibility follows each contract's full history, not the window.
        let run = strategy.run_slice(bars, source.contract_last_bars());

        debug!(
            strategy = %strategy_id,
            contract = %label,
            bars = bars.len(),
            trades = run.metrics.trades,
            pnl_net = %run.metrics.pnl_net,
            "Backtest run complete"
        );

        StrategyResult {
            strategy_id: strategy_id.to_string(),
            contract_label: label,
            source: source.name.clone(),
            start,
            end,
            metrics: run.metrics,
            trades: run.simulation.trades,
        }
    }
}

//! JSON report writer.
//!
//! Reports are the only place values are rounded; everything upstream keeps
//! full precision.

use anyhow::{Context, Result};
use backtest_core::types::{AggregatedResult, Metrics, StrategyResult, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rounded metric values. Undefined ratios stay `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub pnl_raw: Decimal,
    pub pnl_net: Decimal,
    pub trades: usize,
    pub winrate: Option<f64>,
    pub drawdown: Decimal,
    pub sharpe: Option<f64>,
    pub profit_factor: Option<f64>,
    pub expectancy: Option<Decimal>,
}

impl From<&Metrics> for MetricsReport {
    fn from(m: &Metrics) -> Self {
        Self {
            pnl_raw: m.pnl_raw.round_dp(2),
            pnl_net: m.pnl_net.round_dp(2),
            trades: m.trades,
            winrate: m.winrate.map(round2),
            drawdown: m.drawdown.round_dp(2),
            sharpe: m.sharpe.map(round2),
            profit_factor: m.profit_factor.map(round2),
            expectancy: m.expectancy.map(|e| e.round_dp(2)),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
struct StrategyRow<'a> {
    rank: usize,
    strategy_id: &'a str,
    runs: usize,
    #[serde(flatten)]
    metrics: MetricsReport,
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    strategy_id: &'a str,
    contract: &'a str,
    source: &'a str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(flatten)]
    metrics: MetricsReport,
}

#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    contract: &'a str,
    #[serde(flatten)]
    trade: &'a Trade,
}

/// Job counts and timing of one sweep invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub mode: String,
    pub jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub strategies: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Output location for one sweep invocation.
#[derive(Debug, Clone)]
pub struct ReportContext {
    output_dir: PathBuf,
}

impl ReportContext {
    /// Create the output directory if needed.
    pub fn create(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create report directory {}", output_dir.display()))?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `strategies.json`: aggregated results in the given (ranked) order.
    pub fn write_strategies(&self, ranked: &[AggregatedResult]) -> Result<PathBuf> {
        let rows: Vec<StrategyRow<'_>> = ranked
            .iter()
            .enumerate()
            .map(|(i, r)| StrategyRow {
                rank: i + 1,
                strategy_id: &r.strategy_id,
                runs: r.runs,
                metrics: MetricsReport::from(&r.metrics),
            })
            .collect();

        let path = self.write_json("strategies.json", &rows)?;
        info!(path = %path.display(), strategies = rows.len(), "Wrote strategy ranking");
        Ok(path)
    }

    /// `summary_<strategy>.json`: one row per run, without trade ledgers.
    pub fn write_summary(&self, strategy_id: &str, results: &[StrategyResult]) -> Result<PathBuf> {
        let rows: Vec<SummaryRow<'_>> = results
            .iter()
            .map(|r| SummaryRow {
                strategy_id: &r.strategy_id,
                contract: &r.contract_label,
                source: &r.source,
                start: r.start,
                end: r.end,
                metrics: MetricsReport::from(&r.metrics),
            })
            .collect();

        self.write_json(&format!("summary_{strategy_id}.json"), &rows)
    }

    /// `trades_<strategy>.json`: every trade of every run.
    pub fn write_trades(&self, strategy_id: &str, results: &[StrategyResult]) -> Result<PathBuf> {
        let rows: Vec<TradeRow<'_>> = results
            .iter()
            .flat_map(|r| {
                r.trades.iter().map(move |trade| TradeRow {
                    contract: &r.contract_label,
                    trade,
                })
            })
            .collect();

        self.write_json(&format!("trades_{strategy_id}.json"), &rows)
    }

    /// `sweep_summary.json`.
    pub fn write_sweep_report(&self, report: &SweepReport) -> Result<PathBuf> {
        self.write_json("sweep_summary.json", report)
    }

    fn write_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let path = self.output_dir.join(file_name);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), value)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "Report written");
        Ok(path)
    }
}

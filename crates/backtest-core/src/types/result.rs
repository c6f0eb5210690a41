//! Backtest result types shared between the runner, aggregator, and report writers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Trade;

/// Performance statistics over a trade ledger.
///
/// Ratios that cannot be computed (no trades, zero variance, no losing trades)
/// are `None` rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub pnl_raw: Decimal,
    pub pnl_net: Decimal,
    pub trades: usize,
    /// Percentage of trades with positive net P&L.
    pub winrate: Option<f64>,
    /// Largest peak-to-trough decline of cumulative net P&L.
    pub drawdown: Decimal,
    pub sharpe: Option<f64>,
    pub profit_factor: Option<f64>,
    pub expectancy: Option<Decimal>,
}

impl Metrics {
    /// Metric set for an empty ledger.
    pub fn empty() -> Self {
        Self {
            pnl_raw: Decimal::ZERO,
            pnl_net: Decimal::ZERO,
            trades: 0,
            winrate: None,
            drawdown: Decimal::ZERO,
            sharpe: None,
            profit_factor: None,
            expectancy: None,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of one simulation run (full range or one window) of one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Canonical parameter encoding, used as the aggregation key.
    pub strategy_id: String,
    /// Contract/window label, e.g. `FUTRTS032024 (2024-01-01 → 2024-01-31)`.
    pub contract_label: String,
    /// Data source the bars came from.
    pub source: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub metrics: Metrics,
    pub trades: Vec<Trade>,
}

/// Metrics recomputed over the union of all ledgers sharing a strategy identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub strategy_id: String,
    /// Number of StrategyResults merged into this one.
    pub runs: usize,
    pub metrics: Metrics,
}

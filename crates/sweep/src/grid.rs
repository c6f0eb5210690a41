//! Parameter grid expansion into sweep jobs.

use backtest_core::config::ParameterGrid;
use backtester::SmaRsiParams;
use std::fmt;
use tracing::debug;

/// One parameter combination to backtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepJob {
    pub params: SmaRsiParams,
}

impl SweepJob {
    pub fn strategy_id(&self) -> String {
        self.params.strategy_id()
    }
}

impl fmt::Display for SweepJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.strategy_id())
    }
}

/// Cartesian product of the grid, keeping only `rsi_buy > rsi_sell`.
pub fn build_jobs(grid: &ParameterGrid, atr_period: usize) -> Vec<SweepJob> {
    let mut jobs = Vec::with_capacity(grid.raw_len());

    for &sma_period in &grid.sma_values {
        for &rsi_period in &grid.rsi_values {
            for &rsi_buy in &grid.rsi_buy_thresholds {
                for &rsi_sell in &grid.rsi_sell_thresholds {
                    if rsi_buy <= rsi_sell {
                        continue;
                    }
                    jobs.push(SweepJob {
                        params: SmaRsiParams {
                            sma_period,
                            rsi_period,
                            atr_period,
                            rsi_buy,
                            rsi_sell,
                        },
                    });
                }
            }
        }
    }

    debug!(
        combinations = grid.raw_len(),
        jobs = jobs.len(),
        "Expanded parameter grid"
    );
    jobs
}

//! Merge per-run results into one result per strategy.

use backtest_core::types::{AggregatedResult, StrategyResult, Trade};
use std::collections::BTreeMap;

use crate::evaluator::evaluate;

/// Group results by strategy identity and re-evaluate each group over the
/// concatenation of its ledgers.
///
/// Per-run metrics are never averaged. The output is ordered by strategy
/// identity, so the result does not depend on input order.
pub fn aggregate_by_strategy(results: &[StrategyResult]) -> Vec<AggregatedResult> {
    let mut groups: BTreeMap<&str, (usize, Vec<Trade>)> = BTreeMap::new();

    for result in results {
        let (runs, trades) = groups.entry(result.strategy_id.as_str()).or_default();
        *runs += 1;
        trades.extend(result.trades.iter().cloned());
    }

    groups
        .into_iter()
        .map(|(strategy_id, (runs, trades))| AggregatedResult {
            strategy_id: strategy_id.to_string(),
            runs,
            metrics: evaluate(&trades),
        })
        .collect()
}

/// Sort aggregated results by net P&L, best first. Ties keep identity order.
pub fn rank_by_pnl(results: &mut [AggregatedResult]) {
    results.sort_by(|a, b| {
        b.metrics
            .pnl_net
            .cmp(&a.metrics.pnl_net)
            .then_with(|| a.strategy_id.cmp(&b.strategy_id))
    });
}

//! Performance metrics over a trade ledger.

use backtest_core::types::{Metrics, Trade};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Compute the full metric set. An empty ledger yields [`Metrics::empty`].
pub fn evaluate(trades: &[Trade]) -> Metrics {
    if trades.is_empty() {
        return Metrics::empty();
    }

    let pnl: Vec<Decimal> = trades.iter().map(|t| t.pnl_net).collect();

    Metrics {
        pnl_raw: trades.iter().map(|t| t.pnl_raw).sum(),
        pnl_net: pnl.iter().sum(),
        trades: trades.len(),
        winrate: winrate(&pnl),
        drawdown: max_drawdown(&pnl),
        sharpe: sharpe_ratio(&pnl),
        profit_factor: profit_factor(&pnl),
        expectancy: expectancy(&pnl),
    }
}

/// Largest drop of cumulative P&L below its running maximum.
///
/// The running maximum starts at the first cumulative value, so a ledger that
/// only loses reports the decline after its first trade.
pub fn max_drawdown(pnl: &[Decimal]) -> Decimal {
    let mut equity = Decimal::ZERO;
    let mut peak: Option<Decimal> = None;
    let mut max_drawdown = Decimal::ZERO;

    for value in pnl {
        equity += *value;
        let current_peak = peak.map_or(equity, |p| p.max(equity));
        peak = Some(current_peak);
        max_drawdown = max_drawdown.max(current_peak - equity);
    }

    max_drawdown
}

/// Percentage of trades with positive P&L.
pub fn winrate(pnl: &[Decimal]) -> Option<f64> {
    if pnl.is_empty() {
        return None;
    }
    let wins = pnl.iter().filter(|p| **p > Decimal::ZERO).count();
    Some(wins as f64 / pnl.len() as f64 * 100.0)
}

/// `mean / std * sqrt(n)` with population standard deviation and no
/// risk-free rate. Undefined for an empty ledger or zero variance.
pub fn sharpe_ratio(pnl: &[Decimal]) -> Option<f64> {
    if pnl.is_empty() {
        return None;
    }

    let n = Decimal::from(pnl.len());
    let mean = pnl.iter().sum::<Decimal>() / n;
    let variance = pnl
        .iter()
        .map(|p| (*p - mean) * (*p - mean))
        .sum::<Decimal>()
        / n;

    if variance.is_zero() {
        return None;
    }

    let std_dev = variance.to_f64()?.sqrt();
    let sharpe = mean.to_f64()? / std_dev * (pnl.len() as f64).sqrt();
    sharpe.is_finite().then_some(sharpe)
}

/// Gross profit over gross loss. Undefined when no trade lost money.
pub fn profit_factor(pnl: &[Decimal]) -> Option<f64> {
    let gross_profit: Decimal = pnl.iter().filter(|p| **p > Decimal::ZERO).sum();
    let gross_loss: Decimal = pnl.iter().filter(|p| **p < Decimal::ZERO).map(|p| p.abs()).sum();

    if gross_loss.is_zero() {
        return None;
    }
    (gross_profit / gross_loss).to_f64()
}

/// Probability-weighted average trade. Break-even trades count with the losers.
pub fn expectancy(pnl: &[Decimal]) -> Option<Decimal> {
    if pnl.is_empty() {
        return None;
    }

    let (wins, losses): (Vec<Decimal>, Vec<Decimal>) = pnl.iter().partition(|p| **p > Decimal::ZERO);
    let average = |values: &[Decimal]| {
        if values.is_empty() {
            Decimal::ZERO
        } else {
            values.iter().sum::<Decimal>() / Decimal::from(values.len())
        }
    };

    let win_fraction = Decimal::from(wins.len()) / Decimal::from(pnl.len());
    Some(win_fraction * average(&wins) + (Decimal::ONE - win_fraction) * average(&losses))
}

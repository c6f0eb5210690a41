//! Trade simulators with commission and slippage cost models.
//!
//! A simulator walks a bar sequence with a one-bar execution lag: the signal
//! computed on bar `i - 1` is executed at the open of bar `i`. The position
//! always follows the lagged signal (flat, long, or short), and every close
//! books a [`Trade`].

use backtest_core::types::{Bar, ExitReason, Side, Signal, Trade};
use std::collections::HashMap;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rollover::RolloverSimulator;

/// Configuration for trade cost modelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Commission charged on the absolute entry and exit prices (e.g. 0.0004).
    pub commission_rate: Decimal,
    /// Fixed slippage per side in price points. Charged twice per round trip
    /// regardless of direction.
    pub slippage: Decimal,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(4, 4), // 0.04%
            slippage: Decimal::new(10, 0),
        }
    }
}

impl SimulatorConfig {
    pub fn new(commission_rate: Decimal, slippage: Decimal) -> Self {
        Self {
            commission_rate,
            slippage,
        }
    }

    /// Config with no trading costs.
    pub fn frictionless() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Close `position` at `exit_price` and compute its P&L.
    pub fn close_trade(
        &self,
        position: &OpenPosition,
        exit_time: DateTime<Utc>,
        exit_price: Decimal,
        exit_reason: ExitReason,
    ) -> Trade {
        let pnl_raw = (exit_price - position.entry_price) * position.side.sign();
        let commission = (position.entry_price.abs() + exit_price.abs()) * self.commission_rate;
        let slippage = self.slippage * Decimal::TWO;
        let pnl_net = pnl_raw - commission - slippage;

        Trade {
            entry_time: position.entry_time,
            exit_time,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            pnl_raw,
            commission,
            slippage,
            pnl_net,
            contract_code: position.contract_code.clone(),
            exit_reason,
        }
    }
}

/// A live position held by a simulator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub contract_code: Option<String>,
}

impl OpenPosition {
    /// Open at the bar's open price.
    pub fn open(side: Side, bar: &Bar) -> Self {
        Self {
            side,
            entry_price: bar.open,
            entry_time: bar.timestamp,
            contract_code: bar.contract_code.clone(),
        }
    }
}

/// Result of one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulation {
    /// Realized trades in exit order.
    pub trades: Vec<Trade>,
    /// Exposure still open when the data ran out. Never booked as a trade.
    pub open_position: Option<OpenPosition>,
}

/// Converts bars plus an index-aligned signal series into a trade ledger.
pub trait TradeSimulator: Send + Sync {
    /// Simulator name for logs and reports.
    fn name(&self) -> &'static str;

    /// Run one simulation. `bars` must be ordered by timestamp.
    fn simulate(&self, bars: &[Bar], signals: &[Signal]) -> Simulation;
}

/// Single-instrument simulator.
#[derive(Debug, Clone, Default)]
pub struct BasicSimulator {
    config: SimulatorConfig,
}

impl BasicSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

impl TradeSimulator for BasicSimulator {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn simulate(&self, bars: &[Bar], signals: &[Signal]) -> Simulation {
        check_alignment(bars, signals);

        let mut trades = Vec::new();
        let mut position = None;

        for i in 1..bars.len() {
            let signal = signal_at(signals, i - 1);
            position = apply_signal(&self.config, position, signal, &bars[i], &mut trades);
        }

        if let Some(pos) = &position {
            debug!(
                side = ?pos.side,
                entry_time = %pos.entry_time,
                "Position left open at end of data"
            );
        }

        Simulation {
            trades,
            open_position: position,
        }
    }
}

/// The configured simulator variant.
#[derive(Debug, Clone)]
pub enum SimulatorKind {
    Basic(BasicSimulator),
    Rollover(RolloverSimulator),
}

impl SimulatorKind {
    pub fn basic(config: SimulatorConfig) -> Self {
        SimulatorKind::Basic(BasicSimulator::new(config))
    }

    pub fn rollover(config: SimulatorConfig, lookback: Duration) -> Self {
        SimulatorKind::Rollover(RolloverSimulator::new(config, lookback))
    }

    /// Simulate a slice of a longer series. `last_bars` holds each
    /// contract's last bar time over the whole series; only the rollover
    /// simulator needs it.
    pub fn simulate_slice(
        &self,
        bars: &[Bar],
        signals: &[Signal],
        last_bars: &HashMap<String, DateTime<Utc>>,
    ) -> Simulation {
        match self {
            SimulatorKind::Basic(sim) => sim.simulate(bars, signals),
            SimulatorKind::Rollover(sim) => {
                sim.simulate_with_schedule(bars, signals, &sim.schedule(last_bars))
            }
        }
    }
}

impl TradeSimulator for SimulatorKind {
    fn name(&self) -> &'static str {
        match self {
            SimulatorKind::Basic(sim) => sim.name(),
            SimulatorKind::Rollover(sim) => sim.name(),
        }
    }

    fn simulate(&self, bars: &[Bar], signals: &[Signal]) -> Simulation {
        match self {
            SimulatorKind::Basic(sim) => sim.simulate(bars, signals),
            SimulatorKind::Rollover(sim) => sim.simulate(bars, signals),
        }
    }
}

/// Apply one lagged signal at `bar`'s open and return the resulting position.
pub(crate) fn apply_signal(
    config: &SimulatorConfig,
    position: Option<OpenPosition>,
    signal: Signal,
    bar: &Bar,
    trades: &mut Vec<Trade>,
) -> Option<OpenPosition> {
    match (position, signal.side()) {
        (None, None) => None,
        (None, Some(side)) => Some(OpenPosition::open(side, bar)),
        (Some(pos), None) => {
            trades.push(config.close_trade(&pos, bar.timestamp, bar.open, ExitReason::SignalChange));
            None
        }
        (Some(pos), Some(side)) if side == pos.side => Some(pos),
        (Some(pos), Some(side)) => {
            // Reversal: close and reopen on the same open, no flat bar in between.
            trades.push(config.close_trade(&pos, bar.timestamp, bar.open, ExitReason::SignalChange));
            Some(OpenPosition::open(side, bar))
        }
    }
}

/// Signal at index `i`; missing entries read as flat.
pub(crate) fn signal_at(signals: &[Signal], i: usize) -> Signal {
    signals.get(i).copied().unwrap_or_default()
}

pub(crate) fn check_alignment(bars: &[Bar], signals: &[Signal]) {
    if bars.len() != signals.len() {
        warn!(
            bars = bars.len(),
            signals = signals.len(),
            "Signal series is not aligned with bars; missing signals read as flat"
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn hourly_bars(opens: &[i64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        opens
            .iter()
            .enumerate()
            .map(|(i, open)| {
                let open = Decimal::new(*open, 0);
                Bar::new(start + Duration::hours(i as i64), open, open, open, open)
            })
            .collect()
    }

    pub(crate) fn signals(values: &[i8]) -> Vec<Signal> {
        values
            .iter()
            .map(|v| Signal::try_from(*v).unwrap())
            .collect()
    }

    fn frictionless() -> BasicSimulator {
        BasicSimulator::new(SimulatorConfig::frictionless())
    }

    #[test]
    fn test_all_flat_signals_produce_no_trades() {
        let bars = hourly_bars(&[100, 101, 102, 103, 104]);
        let sim = frictionless().simulate(&bars, &signals(&[0, 0, 0, 0, 0]));
        assert!(sim.trades.is_empty());
        assert!(sim.open_position.is_none());
    }

    #[test]
    fn test_signal_executes_on_next_bar_open() {
        let bars = hourly_bars(&[100, 101, 102, 103, 104]);
        let sim = frictionless().simulate(&bars, &signals(&[0, 1, 0, 0, 0]));

        assert_eq!(sim.trades.len(), 1);
        let trade = &sim.trades[0];
        assert_eq!(trade.entry_price, Decimal::new(102, 0));
        assert_eq!(trade.exit_price, Decimal::new(103, 0));
        assert_eq!(trade.entry_time, bars[2].timestamp);
        assert_eq!(trade.exit_time, bars[3].timestamp);
        assert_eq!(trade.pnl_raw, Decimal::ONE);
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.exit_reason, ExitReason::SignalChange);
    }

    #[test]
    fn test_held_signal_exits_when_lagged_signal_goes_flat() {
        // Signal on bar 3 is the first flat one, so the exit lands on bar 4.
        let bars = hourly_bars(&[100, 101, 102, 103, 104]);
        let sim = frictionless().simulate(&bars, &signals(&[0, 1, 1, 0, 0]));

        assert_eq!(sim.trades.len(), 1);
        assert_eq!(sim.trades[0].entry_price, Decimal::new(102, 0));
        assert_eq!(sim.trades[0].exit_price, Decimal::new(104, 0));
        assert_eq!(sim.trades[0].pnl_raw, Decimal::TWO);
    }

    #[test]
    fn test_reversal_closes_and_reopens_on_same_bar() {
        let bars = hourly_bars(&[100, 105, 110, 108, 100]);
        let sim = frictionless().simulate(&bars, &signals(&[1, 1, -1, 0, 0]));

        assert_eq!(sim.trades.len(), 2);
        let long = &sim.trades[0];
        assert_eq!(long.side, Side::Long);
        assert_eq!(long.entry_price, Decimal::new(105, 0));
        assert_eq!(long.exit_price, Decimal::new(108, 0));

        let short = &sim.trades[1];
        assert_eq!(short.side, Side::Short);
        assert_eq!(short.entry_time, long.exit_time);
        assert_eq!(short.entry_price, Decimal::new(108, 0));
        assert_eq!(short.exit_price, Decimal::new(100, 0));
        assert_eq!(short.pnl_raw, Decimal::new(8, 0));
    }

    #[test]
    fn test_open_position_at_end_is_not_a_trade() {
        let bars = hourly_bars(&[100, 101, 102]);
        let sim = frictionless().simulate(&bars, &signals(&[1, 1, 1]));

        assert!(sim.trades.is_empty());
        let open = sim.open_position.unwrap();
        assert_eq!(open.side, Side::Long);
        assert_eq!(open.entry_price, Decimal::new(101, 0));
    }

    #[test]
    fn test_long_pnl_without_costs() {
        let config = SimulatorConfig::frictionless();
        let bars = hourly_bars(&[102, 105]);
        let position = OpenPosition::open(Side::Long, &bars[0]);
        let trade = config.close_trade(&position, bars[1].timestamp, bars[1].open, ExitReason::SignalChange);

        assert_eq!(trade.pnl_raw, Decimal::new(3, 0));
        assert_eq!(trade.pnl_net, Decimal::new(3, 0));
    }

    #[test]
    fn test_commission_and_slippage_applied() {
        let config = SimulatorConfig::new(Decimal::new(4, 4), Decimal::new(10, 0));
        let bars = hourly_bars(&[100, 110]);
        let position = OpenPosition::open(Side::Long, &bars[0]);
        let trade = config.close_trade(&position, bars[1].timestamp, bars[1].open, ExitReason::SignalChange);

        assert_eq!(trade.pnl_raw, Decimal::new(10, 0));
        assert_eq!(trade.commission, Decimal::new(84, 3));
        assert_eq!(trade.slippage, Decimal::new(20, 0));
        assert_eq!(trade.pnl_net, Decimal::new(-10084, 3));
        assert_eq!(trade.pnl_net, trade.pnl_raw - trade.commission - trade.slippage);
    }

    #[test]
    fn test_short_slippage_not_signed_by_direction() {
        let config = SimulatorConfig::new(Decimal::ZERO, Decimal::new(10, 0));
        let bars = hourly_bars(&[110, 100]);
        let position = OpenPosition::open(Side::Short, &bars[0]);
        let trade = config.close_trade(&position, bars[1].timestamp, bars[1].open, ExitReason::SignalChange);

        assert_eq!(trade.pnl_raw, Decimal::new(10, 0));
        assert_eq!(trade.slippage, Decimal::new(20, 0));
        assert_eq!(trade.pnl_net, Decimal::new(-10, 0));
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let bars = hourly_bars(&[100, 103, 99, 104, 101, 98, 105, 107]);
        let sigs = signals(&[1, -1, -1, 1, 0, 1, -1, 0]);
        let sim = BasicSimulator::new(SimulatorConfig::default());

        let first = serde_json::to_string(&sim.simulate(&bars, &sigs)).unwrap();
        let second = serde_json::to_string(&sim.simulate(&bars, &sigs)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_signal_series_reads_missing_as_flat() {
        let bars = hourly_bars(&[100, 101, 102, 103]);
        let sim = frictionless().simulate(&bars, &signals(&[1]));

        assert_eq!(sim.trades.len(), 1);
        assert_eq!(sim.trades[0].entry_price, Decimal::new(101, 0));
        assert_eq!(sim.trades[0].exit_price, Decimal::new(102, 0));
    }
}

//! A strategy pairs a signal analyzer with a trade simulator.

use backtest_core::types::{Bar, Metrics, Signal};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::analyzer::{SignalAnalyzer, SmaRsiAnalyzer, SmaRsiParams};
use crate::evaluator::evaluate;
use crate::simulator::{Simulation, SimulatorKind, TradeSimulator};

/// Output of one analyzer → simulator → evaluator pass.
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub signals: Vec<Signal>,
    pub simulation: Simulation,
    pub metrics: Metrics,
}

/// Signal analyzer plus the simulator that executes its signals.
#[derive(Debug, Clone)]
pub struct Strategy<A: SignalAnalyzer = SmaRsiAnalyzer> {
    analyzer: A,
    simulator: SimulatorKind,
}

impl<A: SignalAnalyzer> Strategy<A> {
    pub fn new(analyzer: A, simulator: SimulatorKind) -> Self {
        Self {
            analyzer,
            simulator,
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn simulator(&self) -> &SimulatorKind {
        &self.simulator
    }

    /// Aggregation key of this strategy.
    pub fn strategy_id(&self) -> String {
        self.analyzer.strategy_id()
    }

    /// Run the pipeline over `bars`, which must be ordered by timestamp.
    pub fn run(&self, bars: &[Bar]) -> StrategyRun {
        let signals = self.analyzer.signals(bars);
        let simulation = self.simulator.simulate(bars, &signals);
        Self::finish(signals, simulation)
    }

    /// Run over a window of a longer series whose contracts end at `last_bars`.
    pub fn run_slice(&self, bars: &[Bar], last_bars: &HashMap<String, DateTime<Utc>>) -> StrategyRun {
        let signals = self.analyzer.signals(bars);
        let simulation = self.simulator.simulate_slice(bars, &signals, last_bars);
        Self::finish(signals, simulation)
    }

    fn finish(signals: Vec<Signal>, simulation: Simulation) -> StrategyRun {
        let metrics = evaluate(&simulation.trades);
        StrategyRun {
            signals,
            simulation,
            metrics,
        }
    }
}

impl Strategy<SmaRsiAnalyzer> {
    /// SMA/RSI strategy from parameters.
    pub fn sma_rsi(params: SmaRsiParams, simulator: SimulatorKind) -> backtest_core::Result<Self> {
        Ok(Self::new(SmaRsiAnalyzer::new(params)?, simulator))
    }
}

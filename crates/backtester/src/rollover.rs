//! Rollover-aware simulation over a stitched futures series.
//!
//! Bars from successive contracts arrive interleaved in one timeline. The
//! simulator trades one active contract at a time and only moves to the next
//! contract once the current bar time has reached the active contract's
//! eligibility point (its last bar minus the lookback). An open position is
//! closed on the last seen bar of the expiring contract and carried to the new
//! contract at its first eligible open.

use backtest_core::types::{Bar, ExitReason, Signal, Trade};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::simulator::{
    apply_signal, check_alignment, signal_at, OpenPosition, Simulation, SimulatorConfig,
    TradeSimulator,
};

/// Earliest time each contract may be vacated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloverSchedule {
    eligible_at: HashMap<String, DateTime<Utc>>,
}

/// Last bar time of every contract in `bars`.
pub fn contract_last_bars(bars: &[Bar]) -> HashMap<String, DateTime<Utc>> {
    let mut last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
    for bar in bars {
        last_seen
            .entry(bar.contract().to_string())
            .and_modify(|ts| *ts = (*ts).max(bar.timestamp))
            .or_insert(bar.timestamp);
    }
    last_seen
}

impl RolloverSchedule {
    /// Build from the last bar time of every contract minus `lookback`.
    pub fn from_bars(bars: &[Bar], lookback: Duration) -> Self {
        Self::from_last_bars(&contract_last_bars(bars), lookback)
    }

    /// Build from precomputed contract last bar times. Use this when `bars`
    /// is only a slice of the contracts' full history.
    pub fn from_last_bars(last_bars: &HashMap<String, DateTime<Utc>>, lookback: Duration) -> Self {
        let eligible_at = last_bars
            .iter()
            .map(|(code, last)| (code.clone(), *last - lookback))
            .collect();

        Self { eligible_at }
    }

    pub fn eligible_at(&self, contract_code: &str) -> Option<DateTime<Utc>> {
        self.eligible_at.get(contract_code).copied()
    }

    /// Whether `contract_code` may be vacated at `time`.
    pub fn is_eligible(&self, contract_code: &str, time: DateTime<Utc>) -> bool {
        self.eligible_at(contract_code)
            .map(|eligible| time >= eligible)
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.eligible_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eligible_at.is_empty()
    }
}

/// Simulator that stitches successive contracts into one continuous exposure.
#[derive(Debug, Clone)]
pub struct RolloverSimulator {
    config: SimulatorConfig,
    lookback: Duration,
}

impl Default for RolloverSimulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default(), Duration::hours(24))
    }
}

impl RolloverSimulator {
    pub fn new(config: SimulatorConfig, lookback: Duration) -> Self {
        Self { config, lookback }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Schedule for contracts whose full history ends at `last_bars`.
    pub fn schedule(&self, last_bars: &HashMap<String, DateTime<Utc>>) -> RolloverSchedule {
        RolloverSchedule::from_last_bars(last_bars, self.lookback)
    }
}

/// Per-run state. Lives for exactly one `simulate` call.
struct RolloverState<'a> {
    active: Option<&'a str>,
    visited: HashSet<&'a str>,
    last_active_bar: Option<&'a Bar>,
    /// Signal of the last processed bar on the active contract, executed on the next one.
    pending: Signal,
    position: Option<OpenPosition>,
    trades: Vec<Trade>,
    rollovers: usize,
}

impl TradeSimulator for RolloverSimulator {
    fn name(&self) -> &'static str {
        "rollover"
    }

    fn simulate(&self, bars: &[Bar], signals: &[Signal]) -> Simulation {
        let schedule = RolloverSchedule::from_bars(bars, self.lookback);
        self.simulate_with_schedule(bars, signals, &schedule)
    }
}

impl RolloverSimulator {
    /// Simulate `bars` against a schedule built from the full contract history.
    pub fn simulate_with_schedule(
        &self,
        bars: &[Bar],
        signals: &[Signal],
        schedule: &RolloverSchedule,
    ) -> Simulation {
        check_alignment(bars, signals);

        // Single forward pass in timestamp order; ties keep input order.
        let mut order: Vec<usize> = (0..bars.len()).collect();
        order.sort_by_key(|&i| bars[i].timestamp);

        let mut state = RolloverState {
            active: None,
            visited: HashSet::new(),
            last_active_bar: None,
            pending: Signal::Flat,
            position: None,
            trades: Vec::new(),
            rollovers: 0,
        };

        for i in order {
            let bar = &bars[i];
            let code = bar.contract();

            let Some(active) = state.active else {
                state.active = Some(code);
                state.visited.insert(code);
                state.last_active_bar = Some(bar);
                state.pending = signal_at(signals, i);
                continue;
            };

            if code != active {
                if state.visited.contains(code) {
                    debug!(contract = code, time = %bar.timestamp, "Skipping bar of a vacated contract");
                    continue;
                }
                if !schedule.is_eligible(active, bar.timestamp) {
                    // Too early to leave the active contract.
                    continue;
                }
                self.roll(&mut state, code, bar);
                state.pending = signal_at(signals, i);
                continue;
            }

            state.position = apply_signal(
                &self.config,
                state.position.take(),
                state.pending,
                bar,
                &mut state.trades,
            );
            state.last_active_bar = Some(bar);
            state.pending = signal_at(signals, i);
        }

        if let Some(pos) = &state.position {
            debug!(
                side = ?pos.side,
                contract = pos.contract_code.as_deref().unwrap_or(""),
                "Position left open at end of data"
            );
        }

        debug!(
            contracts = schedule.len(),
            rollovers = state.rollovers,
            trades = state.trades.len(),
            "Rollover simulation finished"
        );

        Simulation {
            trades: state.trades,
            open_position: state.position,
        }
    }

    /// Move from the active contract to `next` at `bar`.
    fn roll<'a>(&self, state: &mut RolloverState<'a>, next: &'a str, bar: &'a Bar) {
        let previous = state.active.unwrap_or("");

        let carried = match (state.position.take(), state.last_active_bar) {
            // Opened on the bar the roll happens at: nothing to book.
            (Some(pos), Some(last)) if pos.entry_time >= last.timestamp => Some(pos.side),
            (Some(pos), Some(last)) => {
                state.trades.push(self.config.close_trade(
                    &pos,
                    last.timestamp,
                    last.close,
                    ExitReason::Rollover,
                ));
                Some(pos.side)
            }
            (pos, _) => pos.map(|p| p.side),
        };

        state.active = Some(next);
        state.visited.insert(next);
        state.last_active_bar = Some(bar);
        state.rollovers += 1;

        // Carry and the pending signal resolve together on this open.
        state.position = state.pending.side().map(|side| OpenPosition::open(side, bar));

        debug!(
            from = previous,
            to = next,
            time = %bar.timestamp,
            carried = ?carried,
            reopened = ?state.position.as_ref().map(|p| p.side),
            "Contract rollover"
        );
    }
}

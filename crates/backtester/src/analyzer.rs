//! Signal analyzers: indicator calculation and per-bar signal rules.

use backtest_core::types::{Bar, Signal};
use backtest_core::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ta::indicators::{SimpleMovingAverage, TrueRange};
use ta::{Close, High, Low, Next};

/// A bar annotated with indicator values. Values are `None` until the
/// indicator has seen its full period on the bar's contract.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedBar<'a> {
    pub bar: &'a Bar,
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
}

/// Turns bars into trading signals.
pub trait SignalAnalyzer: Send + Sync {
    /// Short strategy family name used as the identity prefix.
    fn name(&self) -> &str;

    /// Tunable parameters in identity order.
    fn params(&self) -> Vec<(&'static str, String)>;

    /// Annotate bars with indicator values. Does not modify the input.
    fn calculate<'a>(&self, bars: &'a [Bar]) -> Vec<AnalyzedBar<'a>>;

    /// Signal for a single analyzed bar.
    fn get_signal(&self, row: &AnalyzedBar<'_>) -> Signal;

    /// Signal series index-aligned to `bars`.
    fn signals(&self, bars: &[Bar]) -> Vec<Signal> {
        self.calculate(bars)
            .iter()
            .map(|row| self.get_signal(row))
            .collect()
    }

    /// Canonical identity, e.g. `SMARSI_sma20_rsi7_atr14_buy60_sell45`.
    fn strategy_id(&self) -> String {
        let params: Vec<String> = self
            .params()
            .into_iter()
            .map(|(key, value)| format!("{key}{value}"))
            .collect();
        format!("{}_{}", self.name(), params.join("_"))
    }
}

/// Parameters of the SMA/RSI trend filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SmaRsiParams {
    pub sma_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub rsi_buy: u32,
    pub rsi_sell: u32,
}

impl Default for SmaRsiParams {
    fn default() -> Self {
        Self {
            sma_period: 50,
            rsi_period: 14,
            atr_period: 14,
            rsi_buy: 55,
            rsi_sell: 45,
        }
    }
}

impl SmaRsiParams {
    pub fn strategy_id(&self) -> String {
        format!(
            "SMARSI_sma{}_rsi{}_atr{}_buy{}_sell{}",
            self.sma_period, self.rsi_period, self.atr_period, self.rsi_buy, self.rsi_sell
        )
    }
}

/// Long above the SMA with strong RSI, short below it with weak RSI.
///
/// RSI averages gains and losses with a simple rolling mean. Indicators restart
/// for every contract in the input.
#[derive(Debug, Clone)]
pub struct SmaRsiAnalyzer {
    params: SmaRsiParams,
    /// Fresh indicator state, cloned for every contract.
    initial: IndicatorState,
}

impl SmaRsiAnalyzer {
    pub fn new(params: SmaRsiParams) -> Result<Self> {
        let initial = IndicatorState::new(&params)?;
        Ok(Self { params, initial })
    }
}

impl SignalAnalyzer for SmaRsiAnalyzer {
    fn name(&self) -> &str {
        "SMARSI"
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sma", self.params.sma_period.to_string()),
            ("rsi", self.params.rsi_period.to_string()),
            ("atr", self.params.atr_period.to_string()),
            ("buy", self.params.rsi_buy.to_string()),
            ("sell", self.params.rsi_sell.to_string()),
        ]
    }

    fn calculate<'a>(&self, bars: &'a [Bar]) -> Vec<AnalyzedBar<'a>> {
        let mut states: HashMap<&str, IndicatorState> = HashMap::new();

        bars.iter()
            .map(|bar| {
                let state = states
                    .entry(bar.contract())
                    .or_insert_with(|| self.initial.clone());
                state.next(bar)
            })
            .collect()
    }

    fn get_signal(&self, row: &AnalyzedBar<'_>) -> Signal {
        let (Some(sma), Some(rsi)) = (row.sma, row.rsi) else {
            return Signal::Flat;
        };
        let Some(close) = row.bar.close.to_f64() else {
            return Signal::Flat;
        };

        if close > sma && rsi > f64::from(self.params.rsi_buy) {
            Signal::Long
        } else if close < sma && rsi < f64::from(self.params.rsi_sell) {
            Signal::Short
        } else {
            Signal::Flat
        }
    }
}

struct Prices {
    high: f64,
    low: f64,
    close: f64,
}

impl High for Prices {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Prices {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Prices {
    fn close(&self) -> f64 {
        self.close
    }
}

/// Rolling indicator state for one contract.
#[derive(Debug, Clone)]
struct IndicatorState {
    periods: (usize, usize, usize),
    sma: SimpleMovingAverage,
    avg_gain: SimpleMovingAverage,
    avg_loss: SimpleMovingAverage,
    true_range: TrueRange,
    atr: SimpleMovingAverage,
    prev_close: Option<f64>,
    seen: usize,
}

impl IndicatorState {
    fn new(params: &SmaRsiParams) -> Result<Self> {
        let window = |period: usize, name: &str| {
            SimpleMovingAverage::new(period).map_err(|e| Error::Analyzer {
                message: format!("invalid {name} period {period}: {e:?}"),
            })
        };

        Ok(Self {
            periods: (params.sma_period, params.rsi_period, params.atr_period),
            sma: window(params.sma_period, "sma")?,
            avg_gain: window(params.rsi_period, "rsi")?,
            avg_loss: window(params.rsi_period, "rsi")?,
            true_range: TrueRange::new(),
            atr: window(params.atr_period, "atr")?,
            prev_close: None,
            seen: 0,
        })
    }

    fn next<'a>(&mut self, bar: &'a Bar) -> AnalyzedBar<'a> {
        let prices = Prices {
            high: bar.high.to_f64().unwrap_or(f64::NAN),
            low: bar.low.to_f64().unwrap_or(f64::NAN),
            close: bar.close.to_f64().unwrap_or(f64::NAN),
        };
        self.seen += 1;

        let sma = self.sma.next(prices.close);

        // The first bar has no prior close and contributes a zero change.
        let delta = self.prev_close.map_or(0.0, |prev| prices.close - prev);
        self.prev_close = Some(prices.close);
        let gain = self.avg_gain.next(delta.max(0.0));
        let loss = self.avg_loss.next((-delta).max(0.0));

        let tr = self.true_range.next(&prices);
        let atr = self.atr.next(tr);

        let (sma_period, rsi_period, atr_period) = self.periods;
        AnalyzedBar {
            bar,
            sma: (self.seen >= sma_period).then_some(sma),
            rsi: if self.seen >= rsi_period { rsi_from(gain, loss) } else { None },
            atr: (self.seen >= atr_period).then_some(atr),
        }
    }
}

/// `100 - 100 / (1 + gain / loss)`; undefined when both averages are zero.
fn rsi_from(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn bars(closes: &[i64], contract: &str) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let close = Decimal::new(*c, 0);
                Bar::new(
                    start + Duration::hours(i as i64),
                    close,
                    close + Decimal::ONE,
                    close - Decimal::ONE,
                    close,
                )
                .with_contract(contract)
            })
            .collect()
    }

    fn analyzer(sma: usize, rsi: usize, buy: u32, sell: u32) -> SmaRsiAnalyzer {
        SmaRsiAnalyzer::new(SmaRsiParams {
            sma_period: sma,
            rsi_period: rsi,
            atr_period: 2,
            rsi_buy: buy,
            rsi_sell: sell,
        })
        .unwrap()
    }

    #[test]
    fn test_strategy_id_format() {
        let params = SmaRsiParams {
            sma_period: 20,
            rsi_period: 7,
            atr_period: 14,
            rsi_buy: 60,
            rsi_sell: 45,
        };
        let analyzer = SmaRsiAnalyzer::new(params).unwrap();

        assert_eq!(params.strategy_id(), "SMARSI_sma20_rsi7_atr14_buy60_sell45");
        assert_eq!(analyzer.strategy_id(), params.strategy_id());
    }

    #[test]
    fn test_zero_period_rejected() {
        let params = SmaRsiParams {
            sma_period: 0,
            ..SmaRsiParams::default()
        };
        assert!(matches!(SmaRsiAnalyzer::new(params), Err(Error::Analyzer { .. })));
    }

    #[test]
    fn test_warm_up_has_no_values() {
        let input = bars(&[10, 11, 12, 13, 14], "A");
        let rows = analyzer(3, 4, 60, 40).calculate(&input);

        assert_eq!(rows[0].sma, None);
        assert_eq!(rows[1].sma, None);
        assert_eq!(rows[2].sma, Some(11.0));
        assert_eq!(rows[2].rsi, None);
        assert_eq!(rows[3].rsi, Some(100.0));
        assert_eq!(rows[0].atr, None);
        assert!(rows[1].atr.is_some());
    }

    #[test]
    fn test_rsi_uses_rolling_means() {
        // changes: 0, +2, -1, +3 -> gains mean 5/4, losses mean 1/4
        let input = bars(&[10, 12, 11, 14], "A");
        let rows = analyzer(1, 4, 60, 40).calculate(&input);
        let rsi = rows[3].rsi.unwrap();
        assert!((rsi - (100.0 - 100.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_signals_follow_trend() {
        let analyzer = analyzer(3, 3, 60, 40);

        let rising = analyzer.signals(&bars(&[10, 11, 12, 13, 14], "A"));
        assert_eq!(rising[..2], [Signal::Flat, Signal::Flat]);
        assert!(rising[2..].iter().all(|s| *s == Signal::Long));

        let falling = analyzer.signals(&bars(&[14, 13, 12, 11, 10], "A"));
        assert!(falling[2..].iter().all(|s| *s == Signal::Short));

        let flat = analyzer.signals(&bars(&[10, 10, 10, 10], "A"));
        assert!(flat.iter().all(|s| s.is_flat()));
    }

    #[test]
    fn test_indicators_restart_per_contract() {
        let mut input = bars(&[10, 11, 12], "A");
        input.extend(bars(&[50, 51], "B"));
        let rows = analyzer(3, 3, 60, 40).calculate(&input);

        assert_eq!(rows[2].sma, Some(11.0));
        // B has only two bars of its own
        assert_eq!(rows[3].sma, None);
        assert_eq!(rows[4].sma, None);
    }

    #[test]
    fn test_calculate_leaves_input_untouched() {
        let input = bars(&[10, 11, 12, 13], "A");
        let before = input.clone();
        let rows = analyzer(2, 2, 60, 40).calculate(&input);
        assert_eq!(rows.len(), input.len());
        assert_eq!(input, before);
    }
}

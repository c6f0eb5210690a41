//! Sweep configuration.
//!
//! Values are layered from built-in defaults, an optional TOML file, and
//! `BACKTEST__*` environment variables (e.g. `BACKTEST__WINDOW_DAYS=30`).

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parameter grid preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// A single combination, with per-strategy trade reports.
    #[default]
    Debug,
    /// The standard grid.
    Full,
    /// Every threshold pairing, including implausible ones.
    Exhaustive,
}

/// Bar resolution strategies run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    #[default]
    Minute,
    Hour,
}

/// SMA/RSI parameter lists swept as a cartesian product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub sma_values: Vec<usize>,
    pub rsi_values: Vec<usize>,
    pub rsi_buy_thresholds: Vec<u32>,
    pub rsi_sell_thresholds: Vec<u32>,
}

impl ParameterGrid {
    pub fn for_mode(mode: SweepMode) -> Self {
        match mode {
            SweepMode::Debug => Self {
                sma_values: vec![20],
                rsi_values: vec![7],
                rsi_buy_thresholds: vec![60],
                rsi_sell_thresholds: vec![45],
            },
            SweepMode::Full => Self {
                sma_values: vec![20, 40, 60, 100],
                rsi_values: vec![7, 14, 21],
                rsi_buy_thresholds: vec![60, 65, 70, 75],
                rsi_sell_thresholds: vec![30, 35, 40, 45],
            },
            SweepMode::Exhaustive => Self {
                sma_values: vec![20, 40, 60, 100],
                rsi_values: vec![7, 14, 21],
                rsi_buy_thresholds: (1..=8).map(|i| i * 10).collect(),
                rsi_sell_thresholds: (2..=9).rev().map(|i| i * 10).collect(),
            },
        }
    }

    /// Number of combinations before the `buy > sell` filter.
    pub fn raw_len(&self) -> usize {
        self.sma_values.len()
            * self.rsi_values.len()
            * self.rsi_buy_thresholds.len()
            * self.rsi_sell_thresholds.len()
    }
}

/// Configuration for one parameter sweep invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub mode: SweepMode,
    /// Directory holding `<CONTRACT>_candle_interval_minute.json` files.
    pub data_dir: PathBuf,
    /// Directory reports are written to.
    pub output_dir: PathBuf,
    pub timeframe: Timeframe,
    /// Contracts to test. Empty means every contract found in `data_dir`.
    pub tickers: Vec<String>,
    /// Sliding window width. `None` runs the full range.
    pub window_days: Option<i64>,
    /// Window stride. Defaults to `window_days`.
    pub stride_days: Option<i64>,
    pub exclude_days_start: i64,
    pub exclude_days_end: i64,
    pub max_workers: usize,
    pub commission_rate: Decimal,
    /// Fixed per-side slippage in price points.
    pub slippage: Decimal,
    /// Stitch all contracts into one virtual instrument and roll positions.
    pub rollover: bool,
    pub rollover_lookback_hours: i64,
    pub atr_period: usize,
    pub save_individual_reports: bool,
    pub sma_values: Option<Vec<usize>>,
    pub rsi_values: Option<Vec<usize>>,
    pub rsi_buy_thresholds: Option<Vec<u32>>,
    pub rsi_sell_thresholds: Option<Vec<u32>>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            mode: SweepMode::Debug,
            data_dir: PathBuf::from("data/candles_filtered"),
            output_dir: PathBuf::from("reports"),
            timeframe: Timeframe::Minute,
            tickers: Vec::new(),
            window_days: None,
            stride_days: None,
            exclude_days_start: 0,
            exclude_days_end: 0,
            max_workers: 8,
            commission_rate: Decimal::new(4, 4), // 0.04%
            slippage: Decimal::new(10, 0),
            rollover: false,
            rollover_lookback_hours: 24,
            atr_period: 14,
            save_individual_reports: false,
            sma_values: None,
            rsi_values: None,
            rsi_buy_thresholds: None,
            rsi_sell_thresholds: None,
        }
    }
}

impl SweepConfig {
    /// Load configuration from an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("BACKTEST")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("tickers")
                .with_list_parse_key("sma_values")
                .with_list_parse_key("rsi_values")
                .with_list_parse_key("rsi_buy_thresholds")
                .with_list_parse_key("rsi_sell_thresholds"),
        );

        let config: SweepConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(file = ?path, mode = ?config.mode, "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text, without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: SweepConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(window) = self.window_days {
            if window <= 0 {
                return Err(Error::config("window_days must be positive"));
            }
        }
        if let Some(stride) = self.stride_days {
            if stride <= 0 {
                return Err(Error::config("stride_days must be positive"));
            }
            if self.window_days.is_none() {
                return Err(Error::config("stride_days requires window_days"));
            }
        }
        if self.exclude_days_start < 0 || self.exclude_days_end < 0 {
            return Err(Error::config("excluded day counts cannot be negative"));
        }
        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be at least 1"));
        }
        if self.commission_rate < Decimal::ZERO || self.slippage < Decimal::ZERO {
            return Err(Error::config("commission_rate and slippage cannot be negative"));
        }
        if self.rollover_lookback_hours < 0 {
            return Err(Error::config("rollover_lookback_hours cannot be negative"));
        }
        if self.atr_period == 0 {
            return Err(Error::config("atr_period must be at least 1"));
        }
        Ok(())
    }

    /// Mode preset with any explicit parameter lists applied on top.
    pub fn parameter_grid(&self) -> ParameterGrid {
        let mut grid = ParameterGrid::for_mode(self.mode);
        if self.mode == SweepMode::Exhaustive {
            warn!("Exhaustive mode sweeps implausible threshold pairs; expect a long run");
        }
        if let Some(values) = &self.sma_values {
            grid.sma_values = values.clone();
        }
        if let Some(values) = &self.rsi_values {
            grid.rsi_values = values.clone();
        }
        if let Some(values) = &self.rsi_buy_thresholds {
            grid.rsi_buy_thresholds = values.clone();
        }
        if let Some(values) = &self.rsi_sell_thresholds {
            grid.rsi_sell_thresholds = values.clone();
        }
        grid
    }

    /// Debug mode always keeps per-strategy trade reports.
    pub fn individual_reports(&self) -> bool {
        self.save_individual_reports || self.mode == SweepMode::Debug
    }
}

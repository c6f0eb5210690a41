//! Historical candle storage backed by per-contract JSON files.
//!
//! The store is populated once and is read-only afterwards, so it can be shared
//! between sweep workers behind an `Arc` without synchronization.

use anyhow::{Context, Result as AnyResult};
use backtest_core::types::{Bar, CandleRecord};
use backtest_core::Result;
use chrono::{DateTime, Duration, DurationRound, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// File name suffix of minute candle files, e.g. `FUTRTS032024_candle_interval_minute.json`.
pub const MINUTE_FILE_SUFFIX: &str = "_candle_interval_minute.json";

/// Query parameters for fetching candles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandleQuery {
    /// Contract codes to fetch (empty = all).
    pub tickers: Vec<String>,
    /// Inclusive start.
    pub start_time: Option<DateTime<Utc>>,
    /// Exclusive end.
    pub end_time: Option<DateTime<Utc>>,
}

impl CandleQuery {
    /// Every contract, whole history.
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a query for a specific time range.
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            tickers: vec![],
            start_time: Some(start),
            end_time: Some(end),
        }
    }

    /// Filter by specific contracts.
    pub fn tickers(mut self, tickers: Vec<String>) -> Self {
        self.tickers = tickers;
        self
    }

    /// Filter by a single contract.
    pub fn ticker(self, ticker: impl Into<String>) -> Self {
        self.tickers(vec![ticker.into()])
    }

    pub fn includes_ticker(&self, code: &str) -> bool {
        self.tickers.is_empty() || self.tickers.iter().any(|t| t == code)
    }

    pub fn includes_time(&self, ts: DateTime<Utc>) -> bool {
        self.start_time.map_or(true, |start| ts >= start) && self.end_time.map_or(true, |end| ts < end)
    }
}

/// Source of ordered OHLCV bars.
#[cfg_attr(test, mockall::automock)]
pub trait CandleProvider: Send + Sync {
    /// Complete minute bars, ordered by timestamp.
    fn minute_candles(&self, query: &CandleQuery) -> Result<Vec<Bar>>;

    /// Hourly bars bucketed from minute records, ordered by timestamp.
    fn hourly_candles(&self, query: &CandleQuery) -> Result<Vec<Bar>>;

    /// Known contract codes, sorted.
    fn available_tickers(&self) -> Vec<String>;
}

/// Raw minute records of one contract.
#[derive(Debug, Clone)]
struct ContractSeries {
    code: String,
    records: Vec<CandleRecord>,
}

impl ContractSeries {
    fn first_time(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|r| r.datetime)
    }

    fn records_in<'a>(&'a self, query: &'a CandleQuery) -> impl Iterator<Item = &'a CandleRecord> + 'a {
        self.records.iter().filter(move |r| query.includes_time(r.datetime))
    }
}

/// In-memory candle store.
#[derive(Debug, Clone, Default)]
pub struct CandleStore {
    /// Ordered by first record time.
    contracts: Vec<ContractSeries>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every minute candle file in `dir`.
    ///
    /// Unreadable or malformed files are logged and skipped.
    pub fn load_dir(dir: &Path) -> AnyResult<Self> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read candle directory {}", dir.display()))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(MINUTE_FILE_SUFFIX))
            })
            .collect();
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let records = match read_records(&path) {
                Ok(records) => records,
                Err(e) => {
                    error!(file = %file_name, error = %e, "Failed to load candle file");
                    continue;
                }
            };

            if records.is_empty() {
                warn!(file = %file_name, "Candle file is empty, skipping");
                continue;
            }

            let code = contract_code_from_source(&file_name);
            info!(file = %file_name, contract = %code, rows = records.len(), "Loaded candle file");
            store.insert(code, records);
        }

        if store.contracts.is_empty() {
            warn!(dir = %dir.display(), "No candle data found");
        }

        Ok(store)
    }

    /// Add (or replace) one contract's minute records.
    pub fn insert(&mut self, code: impl Into<String>, mut records: Vec<CandleRecord>) {
        let code = code.into();
        records.sort_by_key(|r| r.datetime);

        self.contracts.retain(|c| c.code != code);
        self.contracts.push(ContractSeries { code, records });
        self.contracts.sort_by_key(|c| c.first_time());
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    fn matching<'a>(&'a self, query: &'a CandleQuery) -> impl Iterator<Item = &'a ContractSeries> + 'a {
        self.contracts
            .iter()
            .filter(move |c| query.includes_ticker(&c.code))
    }
}

impl CandleProvider for CandleStore {
    fn minute_candles(&self, query: &CandleQuery) -> Result<Vec<Bar>> {
        let series = self
            .matching(query)
            .map(|contract| {
                let bars: Vec<Bar> = contract
                    .records_in(query)
                    .filter_map(|r| r.to_bar(Some(&contract.code)))
                    .collect();
                (contract.code.clone(), bars)
            })
            .collect();

        Ok(stitch_contracts(series))
    }

    fn hourly_candles(&self, query: &CandleQuery) -> Result<Vec<Bar>> {
        let series = self
            .matching(query)
            .map(|contract| {
                let records: Vec<CandleRecord> = contract.records_in(query).cloned().collect();
                (contract.code.clone(), aggregate_hourly(&records, Some(&contract.code)))
            })
            .collect();

        Ok(stitch_contracts(series))
    }

    fn available_tickers(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.contracts.iter().map(|c| c.code.clone()).collect();
        codes.sort();
        codes
    }
}

fn read_records(path: &Path) -> Result<Vec<CandleRecord>> {
    let raw = fs::read_to_string(path)?;
    let records = serde_json::from_str(&raw)?;
    Ok(records)
}

/// Contract code of a data source: the name up to the first `_`.
pub fn contract_code_from_source(source: &str) -> String {
    source.split('_').next().unwrap_or(source).to_string()
}

#[derive(Debug, Default)]
struct HourBucket {
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    volume: Decimal,
}

/// Bucket minute records into hourly bars.
///
/// first(open), max(high), min(low), last(close), sum(volume); buckets missing
/// any of open/high/low/close are dropped.
pub fn aggregate_hourly(records: &[CandleRecord], contract_code: Option<&str>) -> Vec<Bar> {
    let mut buckets: BTreeMap<DateTime<Utc>, HourBucket> = BTreeMap::new();

    for record in records {
        let hour = record
            .datetime
            .duration_trunc(Duration::hours(1))
            .unwrap_or(record.datetime);
        let bucket = buckets.entry(hour).or_default();

        if bucket.open.is_none() {
            bucket.open = record.open;
        }
        if let Some(high) = record.high {
            bucket.high = Some(bucket.high.map_or(high, |h| h.max(high)));
        }
        if let Some(low) = record.low {
            bucket.low = Some(bucket.low.map_or(low, |l| l.min(low)));
        }
        if record.close.is_some() {
            bucket.close = record.close;
        }
        bucket.volume += record.volume.unwrap_or(Decimal::ZERO);
    }

    let total = buckets.len();
    let bars: Vec<Bar> = buckets
        .into_iter()
        .filter_map(|(hour, b)| {
            let bar = Bar {
                timestamp: hour,
                open: b.open?,
                high: b.high?,
                low: b.low?,
                close: b.close?,
                volume: b.volume,
                contract_code: contract_code.map(str::to_string),
            };
            Some(bar)
        })
        .collect();

    if bars.len() < total {
        debug!(
            contract = contract_code.unwrap_or(""),
            dropped = total - bars.len(),
            "Dropped incomplete hourly buckets"
        );
    }

    bars
}

/// Merge per-contract bar sequences into one timeline.
///
/// Contracts are ordered by their first bar; bars sharing a timestamp keep that
/// contract order. Overlapping bars are kept.
pub fn stitch_contracts(mut series: Vec<(String, Vec<Bar>)>) -> Vec<Bar> {
    series.retain(|(_, bars)| !bars.is_empty());
    series.sort_by_key(|(_, bars)| bars.first().map(|b| b.timestamp));

    let mut merged: Vec<Bar> = series.into_iter().flat_map(|(_, bars)| bars).collect();
    merged.sort_by_key(|b| b.timestamp);
    merged
}

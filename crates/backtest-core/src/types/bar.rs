//! Candle types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A complete OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Candle open time.
    #[serde(alias = "datetime")]
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    /// Futures contract this candle belongs to. Absent for single-instrument series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_code: Option<String>,
}

impl Bar {
    /// Create a new bar without volume or contract tag.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: Decimal::ZERO,
            contract_code: None,
        }
    }

    /// Set traded volume.
    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }

    /// Tag the bar with a contract code.
    pub fn with_contract(mut self, contract_code: impl Into<String>) -> Self {
        self.contract_code = Some(contract_code.into());
        self
    }

    /// Contract code, or an empty string for untagged bars.
    pub fn contract(&self) -> &str {
        self.contract_code.as_deref().unwrap_or("")
    }
}

/// A raw candle row as read from a data file. Any price column may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRecord {
    #[serde(alias = "timestamp")]
    pub datetime: DateTime<Utc>,
    #[serde(default)]
    pub open: Option<Decimal>,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub close: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
}

impl CandleRecord {
    /// Convert into a bar. Returns `None` when any of open/high/low/close is missing.
    pub fn to_bar(&self, contract_code: Option<&str>) -> Option<Bar> {
        let bar = Bar {
            timestamp: self.datetime,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume.unwrap_or(Decimal::ZERO),
            contract_code: contract_code.map(str::to_string),
        };
        Some(bar)
    }
}

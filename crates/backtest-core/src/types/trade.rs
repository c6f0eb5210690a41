//! Closed trade records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The lagged signal went flat or reversed.
    SignalChange,
    /// The position was vacated on its expiring contract.
    Rollover,
}

/// A realized round-trip trade.
///
/// This is the exported record schema: field names and types are what report
/// writers consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    /// Gross P&L in price points.
    pub pnl_raw: Decimal,
    pub commission: Decimal,
    /// Round-trip slippage cost.
    pub slippage: Decimal,
    /// `pnl_raw - commission - slippage`.
    pub pnl_net: Decimal,
    #[serde(default)]
    pub contract_code: Option<String>,
    pub exit_reason: ExitReason,
}

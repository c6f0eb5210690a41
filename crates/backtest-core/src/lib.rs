//! Backtest Core Library
//!
//! Shared types, errors, and sweep configuration for the futures backtester.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};

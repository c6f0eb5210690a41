//! Core domain types for the futures backtester.

pub mod bar;
pub mod result;
pub mod signal;
pub mod trade;

pub use bar::*;
pub use result::*;
pub use signal::*;
pub use trade::*;

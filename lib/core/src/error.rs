//! Error handling foundation shared by the ratline crates.
//!
//! Decision-layer crates return their own plain error enums. Boundaries that
//! wrap those errors with context (server startup, configuration) use
//! rootcause reports through this alias.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

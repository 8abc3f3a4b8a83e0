//! Domain Layer - Price action records and the aggregation over them.
//!
//! This layer has no knowledge of the bus, the codec or tracing. All types
//! here are plain Rust with serialization support.

/// Price action record and instrument symbol.
pub mod price_action;

/// Append-only history of consumed records.
pub mod history;

/// Trailing mean of closing prices.
pub mod rolling_average;

//! Price Action Record
//!
//! A single OHLC observation for one instrument, as it travels across the
//! bus. The record is immutable once built; every accessor returns a copy or
//! a borrow.
//!
//! # Schema Variants
//!
//! Two payload variants exist in practice: one carries `volume`, one does
//! not. The record keeps `volume` optional so both decode into the same type.
//!
//! No cross-field invariant (`low <= close <= high`) is enforced here; that is
//! the producer's concern.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// The instrument symbol was empty or whitespace.
    #[error("underlying symbol cannot be empty")]
    EmptyUnderlying,
    /// A replayed record sequence had no records.
    #[error("record sequence cannot be empty")]
    EmptySequence,
}

// =============================================================================
// Underlying
// =============================================================================

/// Non-empty instrument symbol (e.g. `AAPL`, `RUT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Underlying(String);

impl Underlying {
    /// Create a symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EmptyUnderlying`] if the symbol is blank.
    pub fn new(symbol: impl Into<String>) -> Result<Self, DomainError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(DomainError::EmptyUnderlying);
        }
        Ok(Self(symbol))
    }

    /// Borrow the symbol.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Underlying {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Underlying> for String {
    fn from(value: Underlying) -> Self {
        value.0
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Price Action
// =============================================================================

/// One price observation for an instrument.
///
/// # Wire Format (JSON)
///
/// ```json
/// {"open":187.2,"close":188.9,"high":190.1,"low":186.4,"volume":42000,
///  "date":"2024-05-01T10:15:30.123","underlying":"AAPL"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAction {
    open: f64,
    close: f64,
    high: f64,
    low: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<u32>,
    #[serde(rename = "date")]
    timestamp: NaiveDateTime,
    underlying: Underlying,
}

impl PriceAction {
    /// Create a record without volume.
    #[must_use]
    pub const fn new(
        underlying: Underlying,
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Self {
        Self {
            open,
            close,
            high,
            low,
            volume: None,
            timestamp,
            underlying,
        }
    }

    /// Attach a traded volume.
    #[must_use]
    pub fn with_volume(mut self, volume: u32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Opening price.
    #[must_use]
    pub const fn open(&self) -> f64 {
        self.open
    }

    /// Closing price.
    #[must_use]
    pub const fn close(&self) -> f64 {
        self.close
    }

    /// Highest price.
    #[must_use]
    pub const fn high(&self) -> f64 {
        self.high
    }

    /// Lowest price.
    #[must_use]
    pub const fn low(&self) -> f64 {
        self.low
    }

    /// Traded volume, if the payload carried one.
    #[must_use]
    pub const fn volume(&self) -> Option<u32> {
        self.volume
    }

    /// Observation time (local, no offset).
    #[must_use]
    pub const fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Instrument symbol.
    #[must_use]
    pub const fn underlying(&self) -> &Underlying {
        &self.underlying
    }
}

// =============================================================================
// Tests
// =============================================================================

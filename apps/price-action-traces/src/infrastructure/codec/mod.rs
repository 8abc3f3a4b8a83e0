//! Price Action Codec
//!
//! JSON encoding for price action payloads.
//!
//! # Wire Format
//!
//! ```json
//! {"open":187.2,"close":188.9,"high":190.1,"low":186.4,"volume":42000,
//!  "date":"2024-05-01T10:15:30.123","underlying":"AAPL"}
//! ```
//!
//! `volume` is optional on decode and omitted on encode when absent. Unknown
//! fields are ignored so newer producers stay readable.

use crate::domain::price_action::PriceAction;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed (malformed JSON, missing field, bad type).
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload was empty.
    #[error("empty payload")]
    EmptyPayload,
}

/// JSON codec for price action payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a record to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (non-finite prices encode as
    /// `null` and will not decode back).
    pub fn encode(&self, action: &PriceAction) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(action)?)
    }

    /// Decode a record from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is empty, is not valid JSON, misses a
    /// required field or carries an empty `underlying`.
    pub fn decode(&self, payload: &[u8]) -> Result<PriceAction, CodecError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(CodecError::EmptyPayload);
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

//! Price Source Port (Driven Port)
//!
//! Where the producer gets its records from.

use crate::domain::price_action::{DomainError, PriceAction};

/// Supplies one price action per production cycle.
pub trait PriceActionSource: Send {
    /// Produce the next record.
    fn next_price_action(&mut self) -> PriceAction;
}

/// Replays a fixed sequence of records, cycling back to the start.
#[derive(Debug, Clone)]
pub struct FixedPriceSource {
    records: Vec<PriceAction>,
    next: usize,
}

impl FixedPriceSource {
    /// Create a source over `records`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EmptySequence`] if `records` is empty.
    pub fn new(records: Vec<PriceAction>) -> Result<Self, DomainError> {
        if records.is_empty() {
            return Err(DomainError::EmptySequence);
        }
        Ok(Self { records, next: 0 })
    }
}

impl PriceActionSource for FixedPriceSource {
    fn next_price_action(&mut self) -> PriceAction {
        let record = self.records[self.next].clone();
        self.next = (self.next + 1) % self.records.len();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price_action::Underlying;
    use chrono::NaiveDate;

    #[test]
    fn cycles_through_records() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records = vec![
            PriceAction::new(Underlying::new("AAPL").unwrap(), ts, 1.0, 1.0, 1.0, 1.0),
            PriceAction::new(Underlying::new("TSLA").unwrap(), ts, 2.0, 2.0, 2.0, 2.0),
        ];
        let mut source = FixedPriceSource::new(records).unwrap();

        let symbols: Vec<String> = (0..3)
            .map(|_| source.next_price_action().underlying().to_string())
            .collect();
        assert_eq!(symbols, vec!["AAPL", "TSLA", "AAPL"]);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(matches!(
            FixedPriceSource::new(Vec::new()),
            Err(DomainError::EmptySequence)
        ));
    }
}

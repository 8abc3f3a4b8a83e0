//! Price Action History
//!
//! Append-only, arrival-ordered store of consumed records. The consumption
//! loop owns it exclusively, so it carries no locks.
//!
//! # Retention
//!
//! Keeping every record forever grows without bound on a long-running
//! consumer. Retention is therefore bounded by default: once the cap is
//! reached the oldest record is evicted on each append. A cap at least as
//! large as the aggregation window keeps every trailing-window result
//! identical to the unbounded case.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use super::price_action::PriceAction;

/// How many records the history keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep every record.
    Unbounded,
    /// Keep at most this many of the most recent records.
    Bounded(NonZeroUsize),
}

impl Retention {
    /// Build from a raw capacity where `0` means unbounded.
    #[must_use]
    pub fn from_capacity(capacity: usize) -> Self {
        NonZeroUsize::new(capacity).map_or(Self::Unbounded, Self::Bounded)
    }

    /// The cap, if any.
    #[must_use]
    pub const fn cap(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(cap) => Some(cap.get()),
        }
    }
}

/// Ordered store of consumed price actions.
#[derive(Debug, Clone)]
pub struct PriceActionHistory {
    records: VecDeque<PriceAction>,
    retention: Retention,
    appended: u64,
}

impl PriceActionHistory {
    /// Create an empty history with the given retention.
    #[must_use]
    pub fn new(retention: Retention) -> Self {
        let records = match retention {
            Retention::Unbounded => VecDeque::new(),
            Retention::Bounded(cap) => VecDeque::with_capacity(cap.get()),
        };
        Self {
            records,
            retention,
            appended: 0,
        }
    }

    /// Create a history that keeps every record.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(Retention::Unbounded)
    }

    /// Append a record at the end, evicting the oldest one past the cap.
    pub fn append(&mut self, record: PriceAction) {
        if let Retention::Bounded(cap) = self.retention
            && self.records.len() >= cap.get()
        {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.appended += 1;
    }

    /// Number of records currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total records ever appended, including evicted ones.
    #[must_use]
    pub const fn total_appended(&self) -> u64 {
        self.appended
    }

    /// Configured retention.
    #[must_use]
    pub const fn retention(&self) -> Retention {
        self.retention
    }

    /// Most recent record.
    #[must_use]
    pub fn latest(&self) -> Option<&PriceAction> {
        self.records.back()
    }

    /// Records in arrival order, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PriceAction> + ExactSizeIterator {
        self.records.iter()
    }
}

impl Default for PriceActionHistory {
    fn default() -> Self {
        Self::unbounded()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::domain::price_action::Underlying;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_bounded_history_keeps_most_recent(
            cap in 1usize..16,
            values in prop::collection::vec(-1_000.0f64..1_000.0, 0..64),
        ) {
            let ts = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let mut history = PriceActionHistory::new(Retention::from_capacity(cap));
            for v in &values {
                history.append(PriceAction::new(Underlying::new("RUT").unwrap(), ts, *v, *v, *v, *v));
            }

            let kept: Vec<f64> = history.iter().map(PriceAction::close).collect();
            let start = values.len().saturating_sub(cap);
            prop_assert_eq!(kept, values[start..].to_vec());
            prop_assert_eq!(history.total_appended(), values.len() as u64);
        }
    }
}

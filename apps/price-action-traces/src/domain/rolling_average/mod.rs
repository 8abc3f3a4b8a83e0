//! Rolling Average
//!
//! Trailing arithmetic mean of closing prices over the last `k` records of a
//! history. The mean is recomputed from the window on every call, so a call
//! costs O(k) regardless of how long the history is.
//!
//! Windowing is positional (arrival order). Timestamps are not consulted.

use std::num::NonZeroUsize;

use super::history::PriceActionHistory;
use super::price_action::PriceAction;

/// Default window size used by the consumer.
pub const DEFAULT_WINDOW_SIZE: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(size) => size,
    None => unreachable!(),
};

/// Trailing mean of `close` over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingAverage {
    window_size: NonZeroUsize,
}

impl RollingAverage {
    /// Create an aggregator with a fixed window.
    #[must_use]
    pub const fn new(window_size: NonZeroUsize) -> Self {
        Self { window_size }
    }

    /// The window size `k`.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size.get()
    }

    /// Mean close over the last `k` records of `history`.
    ///
    /// Returns `None` while fewer than `k` records are retained, so "no data
    /// yet" is never confused with a genuine zero average.
    #[must_use]
    pub fn compute(&self, history: &PriceActionHistory) -> Option<f64> {
        Self::mean_of_last(history.iter(), self.window_size.get())
    }

    /// Same as [`compute`](Self::compute) over a plain slice.
    #[must_use]
    pub fn compute_slice(&self, records: &[PriceAction]) -> Option<f64> {
        Self::mean_of_last(records.iter(), self.window_size.get())
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean_of_last<'a, I>(records: I, k: usize) -> Option<f64>
    where
        I: DoubleEndedIterator<Item = &'a PriceAction> + ExactSizeIterator,
    {
        if records.len() < k {
            return None;
        }
        let sum: f64 = records.rev().take(k).map(PriceAction::close).sum();
        Some(sum / k as f64)
    }
}

impl Default for RollingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

//! Random Price Generator
//!
//! Synthesizes plausible OHLC bars for a fixed instrument list. Each symbol
//! has a price band; the bar is derived from a base drawn inside the band:
//!
//! ```text
//! base  = U(min, max)
//! open  = base + U(0, 10)
//! high  = open + U(0, 5)
//! low   = max(min, open - U(0, 5))
//! close = U(low, high)
//! ```
//!
//! so `low <= open <= high` and `low <= close <= high` always hold. Volume is
//! a whole number of lots of 1000.

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::application::ports::PriceActionSource;
use crate::domain::price_action::{PriceAction, Underlying};

/// Instruments the generator draws from.
pub const SYMBOLS: [&str; 6] = ["AAPL", "TSLA", "TLT", "VIX", "RUT", "NVDA"];

/// Shares per volume lot.
const LOT_SIZE: u32 = 1000;

/// Inclusive-exclusive price band for a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBand {
    /// Lower bound of the base price.
    pub min: f64,
    /// Upper bound of the base price.
    pub max: f64,
}

impl PriceBand {
    /// Band for `symbol`; unknown symbols get a wide fallback band.
    #[must_use]
    pub fn for_symbol(symbol: &str) -> Self {
        let (min, max) = match symbol {
            "AAPL" => (160.0, 260.0),
            "TSLA" => (250.0, 400.0),
            "TLT" => (80.0, 95.0),
            "VIX" => (14.0, 28.0),
            "RUT" => (1750.0, 2100.0),
            "NVDA" => (100.0, 200.0),
            _ => (100.0, 1100.0),
        };
        Self { min, max }
    }
}

/// Generates random price actions.
#[derive(Debug)]
pub struct RandomPriceGenerator<R = StdRng> {
    rng: R,
    symbols: Vec<Underlying>,
}

impl RandomPriceGenerator<StdRng> {
    /// Generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic generator for tests and replays.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for RandomPriceGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomPriceGenerator<R> {
    /// Generator over an arbitrary RNG.
    pub fn from_rng(rng: R) -> Self {
        let symbols = SYMBOLS
            .iter()
            .filter_map(|s| Underlying::new(*s).ok())
            .collect();
        Self { rng, symbols }
    }

    /// Draw one bar for `underlying`.
    pub fn generate_for(&mut self, underlying: Underlying) -> PriceAction {
        let band = PriceBand::for_symbol(underlying.as_str());
        let rng = &mut self.rng;

        let base = band.min + rng.random::<f64>() * (band.max - band.min);
        let open = base + rng.random::<f64>() * 10.0;
        let high = open + rng.random::<f64>() * 5.0;
        let low = band.min.max(open - rng.random::<f64>() * 5.0);
        let close = low + rng.random::<f64>() * (high - low);
        let volume = rng.random_range(0..1000) * LOT_SIZE;

        PriceAction::new(
            underlying,
            Local::now().naive_local(),
            open,
            high,
            low,
            close,
        )
        .with_volume(volume)
    }

    /// Draw one bar for a uniformly chosen symbol.
    pub fn generate(&mut self) -> PriceAction {
        let index = self.rng.random_range(0..self.symbols.len());
        let underlying = self.symbols[index].clone();
        self.generate_for(underlying)
    }
}

impl<R: Rng + Send> PriceActionSource for RandomPriceGenerator<R> {
    fn next_price_action(&mut self) -> PriceAction {
        self.generate()
    }
}

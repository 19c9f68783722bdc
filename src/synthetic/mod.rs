//! Synthetic day generator: procedural 390-bar paths by
//! pattern archetype, for when no historical day is on hand.
//!
//! Random-walk bar generation uses `rand` for Monte Carlo style simulation,
//! seeded via `rand_chacha::ChaCha8Rng` for reproducible tests. Batch
//! generation of several candidate days uses `rayon` for CPU-bound
//! parallel processing.

use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::historical::{OhlcvBar, TradingDay, BARS_PER_DAY};

/// Named shapes a synthetic day can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Uptrend,
    Downtrend,
    Choppy,
    Volatile,
    VShapeReversal,
}

impl Archetype {
    /// Expressed as a fraction of price drifted per bar.
    fn drift_per_bar(&self) -> f64 {
        match self {
            Archetype::Uptrend => 0.00012,
            Archetype::Downtrend => -0.00012,
            Archetype::Choppy => 0.0,
            Archetype::Volatile => 0.0,
            Archetype::VShapeReversal => 0.0,
        }
    }

    fn vol_per_bar(&self) -> f64 {
        match self {
            Archetype::Uptrend | Archetype::Downtrend => 0.0006,
            Archetype::Choppy => 0.0004,
            Archetype::Volatile => 0.0020,
            Archetype::VShapeReversal => 0.0012,
        }
    }
}

/// Generate one synthetic 390-bar trading day.
pub fn generate_day(
    symbol: &str,
    date: NaiveDate,
    open: i64,
    archetype: Archetype,
    seed: u64,
) -> TradingDay {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(BARS_PER_DAY);
    let mut price = open as f64;
    let drift = archetype.drift_per_bar();
    let vol = archetype.vol_per_bar();

    for i in 0..BARS_PER_DAY {
        let bar_drift = match archetype {
            Archetype::VShapeReversal => {
                // Down for the first half, up for the second.
                let half = BARS_PER_DAY as f64 / 2.0;
                let sign = if (i as f64) < half { -1.0 } else { 1.0 };
                sign * 0.00025
            }
            _ => drift,
        };

        let open_bar = price;
        let shock: f64 = rng.gen_range(-1.0..1.0) * vol;
        let mut close_bar = open_bar * (1.0 + bar_drift + shock);
        if close_bar < 1.0 {
            close_bar = 1.0;
        }

        let wick = (open_bar.max(close_bar) * vol * rng.gen_range(0.0..1.0)).max(0.0);
        let high = open_bar.max(close_bar) + wick;
        let low = (open_bar.min(close_bar) - wick).max(1.0);
        let volume = rng.gen_range(500u64..5_000);

        bars.push(OhlcvBar {
            open: open_bar.round() as i64,
            high: high.round() as i64,
            low: low.round() as i64,
            close: close_bar.round() as i64,
            volume,
        });

        price = close_bar;
    }

    // Force the first bar's open to match the requested open exactly.
    bars[0].open = open;

    TradingDay::new(symbol, date, bars)
}

/// Generate `count` candidate days in parallel and return all of them —
/// callers pick one (e.g. the operator choosing a match's day). A natural
/// use of the ambient `rayon` dependency for a CPU-bound batch of
/// independent random walks.
pub fn generate_batch(
    symbol: &str,
    date: NaiveDate,
    open: i64,
    archetype: Archetype,
    seeds: &[u64],
) -> Vec<TradingDay> {
    seeds
        .par_iter()
        .map(|&seed| generate_day(symbol, date, open, archetype, seed))
        .collect()
}

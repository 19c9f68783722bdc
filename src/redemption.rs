//! Redemption engine: a dynamic create/redeem fee that
//! widens with cumulative volume and elapsed match time.
//!
//! A closed-form fee curve rather than an order-book-derived price,
//! expressed in the ambient style of [`crate::timescaler::TimeScaler`]
//! (a small struct over wall-clock `Instant`, exposing derived getters).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use crate::model::{Cents, Qty};

pub const BASE_FEE: f64 = 0.005;
pub const MAX_FEE: f64 = 0.03;
pub const VOLUME_HALF: f64 = 50_000.0;

/// Tracks cumulative redemption volume and computes the current
/// create/redeem fee from it and elapsed match time.
pub struct RedemptionEngine {
    duration_min: u32,
    started_at: Instant,
    cumulative_volume: AtomicI64,
}

impl RedemptionEngine {
    pub fn new(duration_min: u32) -> Self {
        Self {
            duration_min,
            started_at: Instant::now(),
            cumulative_volume: AtomicI64::new(0),
        }
    }

    fn elapsed_minutes(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() / 60.0
    }

    pub fn cumulative_volume(&self) -> i64 {
        self.cumulative_volume.load(Ordering::Relaxed)
    }

    /// Current fee, bounded to `[BASE_FEE, MAX_FEE]`.
    pub fn current_fee(&self) -> f64 {
        let time_factor = 1.0 + self.elapsed_minutes() / self.duration_min as f64;
        let effective_v = self.cumulative_volume() as f64 * time_factor;
        BASE_FEE + (MAX_FEE - BASE_FEE) * effective_v / (effective_v + VOLUME_HALF)
    }

    pub fn creation_price(&self, nav: Cents) -> Cents {
        ((nav as f64) * (1.0 + self.current_fee())).round() as Cents
    }

    pub fn redemption_price(&self, nav: Cents) -> Cents {
        ((nav as f64) * (1.0 - self.current_fee())).round() as Cents
    }

    /// Create `q` shares at `nav`; returns the per-share creation price.
    pub fn create(&self, nav: Cents, q: Qty) -> Cents {
        let price = self.creation_price(nav);
        self.cumulative_volume.fetch_add(q, Ordering::Relaxed);
        price
    }

    /// Redeem `q` shares at `nav`; returns the per-share redemption price.
    pub fn redeem(&self, nav: Cents, q: Qty) -> Cents {
        let price = self.redemption_price(nav);
        self.cumulative_volume.fetch_add(q, Ordering::Relaxed);
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_starts_at_base_with_zero_volume() {
        let engine = RedemptionEngine::new(10);
        assert!((engine.current_fee() - BASE_FEE).abs() < 1e-9);
    }

    #[test]
    fn fee_is_monotone_non_decreasing_in_volume() {
        let engine = RedemptionEngine::new(10);
        let f0 = engine.current_fee();
        engine.create(10_000, 10_000);
        let f1 = engine.current_fee();
        engine.create(10_000, 40_000);
        let f2 = engine.current_fee();
        assert!(f1 >= f0);
        assert!(f2 >= f1);
        assert!(f2 <= MAX_FEE + 1e-9);
    }

    #[test]
    fn creation_price_above_and_redemption_price_below_nav() {
        let engine = RedemptionEngine::new(10);
        engine.create(10_000, 10_000);
        assert!(engine.creation_price(10_000) > 10_000);
        assert!(engine.redemption_price(10_000) < 10_000);
    }

    #[test]
    fn create_and_redeem_both_add_to_cumulative_volume() {
        let engine = RedemptionEngine::new(10);
        engine.create(10_000, 100);
        engine.redeem(10_000, 50);
        assert_eq!(engine.cumulative_volume(), 150);
    }
}

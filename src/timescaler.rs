//! Time scaler: maps real elapsed time onto a 390-bar market day.
//!
//! A single, monotonic source of truth for "now", driven off real
//! wall-clock time via `std::time::Instant` rather than a simulated nanos
//! counter, since matches run against real elapsed time by design.

use std::time::{Duration, Instant};

use crate::historical::BARS_PER_DAY;

/// Market opens at 9:30 ET.
const MARKET_OPEN_HOUR_24: u32 = 9;
const MARKET_OPEN_MINUTE: u32 = 30;

/// Maps real elapsed time to market elapsed time and bar index for a match
/// of a given real-minute duration. `a = 390 / duration_min`.
#[derive(Debug, Clone)]
pub struct TimeScaler {
    duration_min: u32,
    acceleration: f64,
    started_at: Option<Instant>,
}

impl TimeScaler {
    pub fn new(duration_min: u32) -> Self {
        assert!(duration_min > 0, "match duration must be positive");
        Self {
            duration_min,
            acceleration: BARS_PER_DAY as f64 / duration_min as f64,
            started_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Start as if `elapsed` real time had already passed. Used by tests
    /// and to resume a scaler against a known elapsed duration.
    pub fn start_with_elapsed(&mut self, elapsed: Duration) {
        self.started_at = Instant::now().checked_sub(elapsed);
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    fn elapsed_real(&self) -> Duration {
        self.started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn elapsed_real_secs(&self) -> f64 {
        self.elapsed_real().as_secs_f64()
    }

    pub fn elapsed_market_minutes(&self) -> f64 {
        (self.elapsed_real_secs() / 60.0) * self.acceleration
    }

    pub fn progress(&self) -> f64 {
        let duration_secs = self.duration_min as f64 * 60.0;
        (self.elapsed_real_secs() / duration_secs).clamp(0.0, 1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed_real_secs() >= self.duration_min as f64 * 60.0
    }

    pub fn current_bar_index(&self) -> usize {
        let idx = self.elapsed_market_minutes().floor() as i64;
        idx.clamp(0, BARS_PER_DAY as i64 - 1) as usize
    }

    /// Fraction through the current bar, for intra-bar linear interpolation.
    pub fn bar_fraction(&self) -> f64 {
        let m = self.elapsed_market_minutes();
        (m - m.floor()).clamp(0.0, 1.0)
    }

    /// `9:30 + elapsed_market_minutes`, formatted 12-hour AM/PM (e.g. "12:45 PM").
    pub fn market_time_string(&self) -> String {
        let total_minutes =
            (MARKET_OPEN_HOUR_24 * 60 + MARKET_OPEN_MINUTE) as f64 + self.elapsed_market_minutes();
        let total_minutes = total_minutes.clamp(0.0, 24.0 * 60.0 - 1.0) as u32;
        let hour24 = (total_minutes / 60) % 24;
        let minute = total_minutes % 60;
        let (hour12, meridiem) = match hour24 {
            0 => (12, "AM"),
            1..=11 => (hour24, "AM"),
            12 => (12, "PM"),
            _ => (hour24 - 12, "PM"),
        };
        format!("{hour12}:{minute:02} {meridiem}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceleration_factor_for_each_duration() {
        assert_eq!(TimeScaler::new(10).acceleration, 39.0);
        assert_eq!(TimeScaler::new(15).acceleration, 26.0);
        assert_eq!(TimeScaler::new(30).acceleration, 13.0);
    }

    #[test]
    fn not_started_is_at_the_origin() {
        let scaler = TimeScaler::new(10);
        assert_eq!(scaler.progress(), 0.0);
        assert!(!scaler.is_complete());
        assert_eq!(scaler.current_bar_index(), 0);
        assert_eq!(scaler.market_time_string(), "9:30 AM");
    }

    #[test]
    fn bar_index_is_monotone_non_decreasing_with_time() {
        let mut scaler = TimeScaler::new(10);
        scaler.start();
        let first = scaler.current_bar_index();
        std::thread::sleep(Duration::from_millis(20));
        let second = scaler.current_bar_index();
        assert!(second >= first);
    }

    #[test]
    fn scenario_five_minutes_into_a_ten_minute_match() {
        let mut scaler = TimeScaler::new(10);
        scaler.start_with_elapsed(Duration::from_secs(5 * 60));
        assert!((scaler.progress() - 0.5).abs() < 0.01);
        assert!((scaler.elapsed_market_minutes() - 195.0).abs() < 1.0);
        assert_eq!(scaler.current_bar_index(), 195);
        assert_eq!(scaler.market_time_string(), "12:45 PM");
    }

    #[test]
    fn progress_is_bounded_in_zero_one() {
        let scaler = TimeScaler::new(10);
        assert!(scaler.progress() >= 0.0 && scaler.progress() <= 1.0);
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day is 9:30-16:00 ET at one-minute resolution.
pub const BARS_PER_DAY: usize = 390;

/// One-minute OHLCV bar. Prices are integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
}

/// A full trading day: symbol, date, and exactly `BARS_PER_DAY` bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDay {
    pub symbol: String,
    pub date: NaiveDate,
    pub bars: Vec<OhlcvBar>,
}

impl TradingDay {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, bars: Vec<OhlcvBar>) -> Self {
        debug_assert_eq!(
            bars.len(),
            BARS_PER_DAY,
            "a trading day must contain exactly {BARS_PER_DAY} one-minute bars"
        );
        Self {
            symbol: symbol.into(),
            date,
            bars,
        }
    }

    pub fn open(&self) -> i64 {
        self.bars[0].open
    }

    pub fn close(&self) -> i64 {
        self.bars[BARS_PER_DAY - 1].close
    }

    pub fn high(&self) -> i64 {
        self.bars.iter().map(|b| b.high).max().unwrap_or(0)
    }

    pub fn low(&self) -> i64 {
        self.bars.iter().map(|b| b.low).min().unwrap_or(0)
    }

    pub fn volume(&self) -> u64 {
        self.bars.iter().map(|b| b.volume).sum()
    }
}

/// A `TradingDay` rescaled so its open equals a target open, preserving
/// shape (all OHLC fields scaled by the same factor; volume unchanged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedDay {
    pub day: TradingDay,
    pub scale: f64,
    pub target_open: i64,
}

impl NormalizedDay {
    /// `bar'.price = round(bar.price * scale)` for every OHLC field.
    /// Idempotent when `target_open` already equals `day.open()`.
    pub fn normalize(day: TradingDay, target_open: i64) -> Self {
        let original_open = day.open();
        let scale = if original_open == 0 {
            1.0
        } else {
            target_open as f64 / original_open as f64
        };

        let bars = day
            .bars
            .iter()
            .map(|b| OhlcvBar {
                open: scale_price(b.open, scale),
                high: scale_price(b.high, scale),
                low: scale_price(b.low, scale),
                close: scale_price(b.close, scale),
                volume: b.volume,
            })
            .collect();

        let scaled_day = TradingDay {
            symbol: day.symbol,
            date: day.date,
            bars,
        };

        Self {
            day: scaled_day,
            scale,
            target_open,
        }
    }

    pub fn bar(&self, index: usize) -> OhlcvBar {
        self.day.bars[index.min(BARS_PER_DAY - 1)]
    }
}

#[inline]
fn scale_price(price: i64, scale: f64) -> i64 {
    (price as f64 * scale).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_day(open: i64) -> TradingDay {
        let bars = vec![
            OhlcvBar {
                open,
                high: open + 10,
                low: open - 10,
                close: open,
                volume: 100,
            };
            BARS_PER_DAY
        ];
        TradingDay::new("SIM", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), bars)
    }

    #[test]
    fn normalize_sets_target_open() {
        let day = flat_day(10_000);
        let normalized = NormalizedDay::normalize(day, 20_000);
        assert_eq!(normalized.day.open(), 20_000);
    }

    #[test]
    fn normalize_is_idempotent_when_already_at_target() {
        let day = flat_day(10_000);
        let normalized = NormalizedDay::normalize(day, 10_000);
        assert_eq!(normalized.scale, 1.0);
        assert_eq!(normalized.day.open(), 10_000);
    }

    #[test]
    fn aggregates_match_extrema_and_sum() {
        let day = flat_day(10_000);
        assert_eq!(day.high(), 10_010);
        assert_eq!(day.low(), 9_990);
        assert_eq!(day.volume(), 100 * BARS_PER_DAY as u64);
    }
}

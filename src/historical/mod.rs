//! Historical day model: OHLCV bars, day aggregates, and
//! normalization to a target opening price.

mod bar;

pub use bar::{NormalizedDay, OhlcvBar, TradingDay, BARS_PER_DAY};

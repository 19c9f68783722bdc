//! The continuous limit-order-book matching engine.

mod engine;

pub use engine::{MatchingStats, OrderBook, TradeCallback};

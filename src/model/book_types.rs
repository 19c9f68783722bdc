use super::{Cents, Qty};
use serde::{Deserialize, Serialize};

/// One aggregated price level in a book snapshot: price and total remaining
/// quantity resting at that price across all orders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Cents,
    pub quantity: Qty,
}

/// Per-symbol aggregate bid/ask ladders. Bids descending, asks ascending,
/// the shape serialized for the book snapshot JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Cents> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Cents> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<Cents> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2),
            _ => None,
        }
    }
}

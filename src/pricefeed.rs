//! Price feed: fans a `PriceTick` out to subscribers each
//! time the match publishes a NAV update, blending in a fuzzed market-maker
//! reference and the book's mid price.
//!
//! Uses the same subscribe/unsubscribe-channel shape as a typical market
//! data feed, and borrows [`crate::book::OrderBook`]'s
//! copy-under-lock / send-outside-lock dispatch discipline.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::book::OrderBook;
use crate::model::Cents;

pub const DEFAULT_FUZZ_CENTS: Cents = 10;
const SUBSCRIBER_BUFFER: usize = 256;

/// A synchronized price observation: true NAV, the fuzzed MM
/// reference, book mid, and the match-time context it was observed at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub timestamp: DateTime<Utc>,
    pub nav: Cents,
    pub mm_reference: Cents,
    pub book_mid: Cents,
    pub market_time: String,
    pub progress: f64,
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<PriceTick>,
}

/// Publishes `PriceTick`s derived from match NAV updates and the book's
/// mid price. One feed per traded symbol.
pub struct PriceFeed {
    book: Arc<OrderBook>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    fuzz_cents: AtomicI64,
    cached_book_mid: AtomicI64,
}

impl PriceFeed {
    pub fn new(book: Arc<OrderBook>) -> Arc<Self> {
        Arc::new(Self {
            book,
            subscribers: RwLock::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            fuzz_cents: AtomicI64::new(DEFAULT_FUZZ_CENTS),
            cached_book_mid: AtomicI64::new(0),
        })
    }

    /// Fuzz amount is configurable at runtime.
    pub fn set_fuzz_cents(&self, fuzz: Cents) {
        self.fuzz_cents.store(fuzz, Ordering::Relaxed);
    }

    pub fn subscribe(&self) -> (u64, mpsc::Receiver<PriceTick>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// 100ms background cache refresh for book mid, so a publish in between
    /// match ticks (or a one-sided/empty book) never blocks on a fresh
    /// read of the book.
    pub async fn run_book_mid_refresh_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            let mid = self.book.mid_price().unwrap_or_else(|| self.last_nav());
            self.cached_book_mid.store(mid, Ordering::Relaxed);
        }
    }

    fn last_nav(&self) -> Cents {
        self.cached_book_mid.load(Ordering::Relaxed)
    }

    /// Called from the match's price-tick callback (outside the match
    /// lock). Forms a tick and fans it out non-blocking.
    pub fn publish(&self, nav: Cents, market_time: &str, progress: f64) {
        let fuzz = self.fuzz_cents.load(Ordering::Relaxed);
        let mm_reference = if fuzz > 0 {
            nav + rand::thread_rng().gen_range(-fuzz..=fuzz)
        } else {
            nav
        };
        let book_mid = self.book.mid_price().unwrap_or(nav);
        self.cached_book_mid.store(book_mid, Ordering::Relaxed);

        let tick = PriceTick {
            timestamp: Utc::now(),
            nav,
            mm_reference,
            book_mid,
            market_time: market_time.to_string(),
            progress,
        };

        let subscribers = self.subscribers.read().clone_senders();
        for sender in subscribers {
            // Non-blocking: a full subscriber buffer drops this tick for
            // that subscriber rather than stalling the publisher.
            let _ = sender.try_send(tick.clone());
        }
    }
}

trait CloneSenders {
    fn clone_senders(&self) -> Vec<mpsc::Sender<PriceTick>>;
}

impl CloneSenders for Vec<Subscriber> {
    fn clone_senders(&self) -> Vec<mpsc::Sender<PriceTick>> {
        self.iter().map(|s| s.sender.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_with_fuzzed_reference() {
        let feed = PriceFeed::new(Arc::new(OrderBook::new("SIM", 100)));
        feed.set_fuzz_cents(0);
        let (_id, mut rx) = feed.subscribe();

        feed.publish(10_000, "9:31 AM", 0.01);

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.nav, 10_000);
        assert_eq!(tick.mm_reference, 10_000);
        assert_eq!(tick.book_mid, 10_000); // empty book falls back to NAV
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let feed = PriceFeed::new(Arc::new(OrderBook::new("SIM", 100)));
        let (id, mut rx) = feed.subscribe();
        feed.unsubscribe(id);

        feed.publish(10_000, "9:31 AM", 0.0);
        assert!(rx.recv().await.is_none() || rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn book_mid_used_when_book_has_two_sided_liquidity() {
        use crate::model::{Order, OrderType, Side};

        let book = Arc::new(OrderBook::new("SIM", 100));
        book.submit(Order::new("a", "SIM", Side::Buy, OrderType::Limit, 9_900, 10))
            .unwrap();
        book.submit(Order::new("b", "SIM", Side::Sell, OrderType::Limit, 10_100, 10))
            .unwrap();

        let feed = PriceFeed::new(book);
        feed.set_fuzz_cents(0);
        let (_id, mut rx) = feed.subscribe();
        feed.publish(10_000, "9:31 AM", 0.01);

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.book_mid, 10_000);
    }
}

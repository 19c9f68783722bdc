//! Bot ecosystem: a common actor shape (`Bot`
//! trait) plus market-making, directional, noise/panic and mandated
//! execution strategies, all started/stopped together by a `BotManager`.
//!
//! Each bot is a long-lived actor with an internal `tokio::select!` over an
//! interval and a stop signal, the common shape for background workers in
//! an async server. `async-trait` backs the shared `Bot` trait.

pub mod directional;
pub mod mandate;
pub mod market_maker;
pub mod noise;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::account::Position;
use crate::book::OrderBook;
use crate::error::EngineResult;
use crate::model::{Cents, Order, Qty, Side, Trade};

/// Every bot kind implements this. `run` is the long-lived loop spawned by
/// the `BotManager`; it must select over `stop` and exit promptly once it
/// fires.
#[async_trait]
pub trait Bot: Send + Sync {
    fn id(&self) -> &str;
    async fn run(self: Arc<Self>, stop: watch::Receiver<bool>);
    /// Called from the book's trade callback for every trade in the book,
    /// regardless of side — implementations filter on their own id.
    fn process_trade(&self, trade: &Trade);
}

/// Shared plumbing every bot kind embeds: position tracking (WAP/realized
/// P&L identical to [`crate::account::Position`]) and bookkeeping of this
/// bot's own resting order ids for `cancel_all`.
pub struct BotCore {
    pub id: String,
    pub book: Arc<OrderBook>,
    position: Mutex<Position>,
    resting: Mutex<Vec<String>>,
}

impl BotCore {
    pub fn new(id: impl Into<String>, book: Arc<OrderBook>) -> Self {
        Self {
            id: id.into(),
            book,
            position: Mutex::new(Position::default()),
            resting: Mutex::new(Vec::new()),
        }
    }

    /// Update local position/realized P&L from a trade this bot took part
    /// in. A no-op for trades it wasn't a party to.
    pub fn record_trade(&self, trade: &Trade) {
        let side = if trade.buyer_id == self.id {
            Side::Buy
        } else if trade.seller_id == self.id {
            Side::Sell
        } else {
            return;
        };
        self.position
            .lock()
            .apply_fill(side, trade.quantity, trade.price, Utc::now());
        // Drop any resting id this trade (partially or fully) consumed.
        self.resting.lock().retain(|id| self.book.get_order(id).is_some());
    }

    pub fn position_qty(&self) -> Qty {
        self.position.lock().quantity
    }

    pub fn realized_pnl(&self) -> Cents {
        self.position.lock().realized_pnl
    }

    /// Submit an order and, if it rests, remember its id for `cancel_all`.
    pub fn submit(&self, order: Order) -> EngineResult<Vec<Trade>> {
        let eligible = order.is_resting_eligible();
        let id = order.id.clone();
        let trades = self.book.submit(order)?;
        if eligible && self.book.get_order(&id).is_some() {
            self.resting.lock().push(id);
        }
        Ok(trades)
    }

    /// Cancel every resting order this bot currently has.
    pub fn cancel_all(&self) {
        let ids: Vec<String> = std::mem::take(&mut self.resting.lock());
        for id in ids {
            let _ = self.book.cancel(&id);
        }
    }
}

/// Owns the full set of bots for a match. `start_all`/`stop_all` run in
/// sequence; trade fan-out to bot position tracking happens through a
/// single callback registered on the book.
pub struct BotManager {
    bots: Vec<Arc<dyn Bot>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl BotManager {
    pub fn new(bots: Vec<Arc<dyn Bot>>) -> Arc<Self> {
        let (stop_tx, stop_rx) = watch::channel(false);
        Arc::new(Self {
            bots,
            handles: Mutex::new(Vec::new()),
            stop_tx,
            stop_rx,
        })
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn start_all(&self) {
        let mut handles = self.handles.lock();
        for bot in &self.bots {
            let bot = bot.clone();
            let stop_rx = self.stop_rx.clone();
            handles.push(tokio::spawn(async move { bot.run(stop_rx).await }));
        }
    }

    pub fn stop_all(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// A `TradeCallback` suitable for `OrderBook::on_trade`, fanning every
    /// trade out to every bot's `process_trade`.
    pub fn trade_callback(self: &Arc<Self>) -> crate::book::TradeCallback {
        let manager = self.clone();
        Arc::new(move |trade: &Trade| {
            for bot in &manager.bots {
                bot.process_trade(trade);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderType;

    struct Noop(BotCore);

    #[async_trait]
    impl Bot for Noop {
        fn id(&self) -> &str {
            &self.0.id
        }
        async fn run(self: Arc<Self>, _stop: watch::Receiver<bool>) {}
        fn process_trade(&self, trade: &Trade) {
            self.0.record_trade(trade);
        }
    }

    #[test]
    fn bot_core_tracks_position_from_trades_it_is_party_to() {
        let book = Arc::new(OrderBook::new("SIM", 100));
        let core = BotCore::new("mm1", book.clone());

        core.submit(Order::new("mm1", "SIM", Side::Buy, OrderType::Limit, 10_000, 10))
            .unwrap();
        let trades = book
            .submit(Order::new("taker", "SIM", Side::Sell, OrderType::Market, 0, 10))
            .unwrap();
        for t in &trades {
            core.record_trade(t);
        }

        assert_eq!(core.position_qty(), 10);
    }

    #[tokio::test]
    async fn manager_fans_trades_out_to_every_bot() {
        let book = Arc::new(OrderBook::new("SIM", 100));
        let bot_a: Arc<dyn Bot> = Arc::new(Noop(BotCore::new("a", book.clone())));
        let bot_b: Arc<dyn Bot> = Arc::new(Noop(BotCore::new("b", book.clone())));
        let manager = BotManager::new(vec![bot_a, bot_b]);
        book.on_trade(manager.trade_callback());

        book.submit(Order::new("a", "SIM", Side::Buy, OrderType::Limit, 10_000, 5))
            .unwrap();
        book.submit(Order::new("b", "SIM", Side::Sell, OrderType::Market, 0, 5))
            .unwrap();

        assert_eq!(manager.len(), 2);
    }
}

//! Price–time-priority limit order book.
//!
//! `BTreeMap` price levels, FIFO `VecDeque` per level, an id->location
//! index, and a writer-priority lock around mutation with callbacks fired
//! after the lock is released. Self-trade prevention *skips* the offending
//! resting order rather than cancelling either side.

use crate::error::{EngineError, EngineResult};
use crate::model::{BookLevel, BookSnapshot, Cents, Order, OrderType, Qty, Side, Trade};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

pub type TradeCallback = Arc<dyn Fn(&Trade) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct MatchingStats {
    pub orders_submitted: u64,
    pub orders_cancelled: u64,
    pub fills: u64,
    pub total_volume: i64,
    pub self_trades_skipped: u64,
}

#[derive(Debug, Clone)]
struct OrderLocation {
    side: Side,
    price: Cents,
}

#[derive(Debug, Default)]
struct PriceLevel {
    orders: VecDeque<Order>,
}

impl PriceLevel {
    fn total_remaining(&self) -> Qty {
        self.orders.iter().map(|o| o.remaining()).sum()
    }

    fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

struct BookState {
    bids: BTreeMap<Cents, PriceLevel>,
    asks: BTreeMap<Cents, PriceLevel>,
    orders: HashMap<String, OrderLocation>,
    recent_trades: VecDeque<Trade>,
    stats: MatchingStats,
}

impl BookState {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            recent_trades: VecDeque::new(),
            stats: MatchingStats::default(),
        }
    }

    fn level_for_side(&mut self, side: Side) -> &mut BTreeMap<Cents, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Price levels on the contra side compatible with `incoming`, in the
    /// walk order the aggressor sweeps them (best price first).
    fn matchable_levels(&self, incoming: &Order) -> Vec<Cents> {
        match incoming.side {
            Side::Buy => {
                // Market buy: all asks ascending. Limit buy: asks <= limit.
                self.asks
                    .keys()
                    .copied()
                    .take_while(|&ask| {
                        incoming.order_type == OrderType::Market || ask <= incoming.limit_price
                    })
                    .collect()
            }
            Side::Sell => self
                .bids
                .keys()
                .rev()
                .copied()
                .take_while(|&bid| {
                    incoming.order_type == OrderType::Market || bid >= incoming.limit_price
                })
                .collect(),
        }
    }

    /// Match `incoming` against the book. Mutates `incoming.filled` in
    /// place and returns the trades produced, in the order they occurred
    /// (best price first, FIFO within a level).
    fn match_order(&mut self, incoming: &mut Order, trade_capacity: usize) -> Vec<Trade> {
        let mut trades = Vec::new();
        let contra_side = incoming.side.opposite();
        let levels = self.matchable_levels(incoming);

        'levels: for price in levels {
            if incoming.remaining() <= 0 {
                break 'levels;
            }

            let mut matched_at_level = false;
            let mut i = 0usize;
            let mut level_emptied = false;
            {
                let book = self.level_for_side(contra_side);
                let Some(level) = book.get_mut(&price) else {
                    continue;
                };

                while i < level.orders.len() && incoming.remaining() > 0 {
                    if level.orders[i].owner_id == incoming.owner_id {
                        // Self-trade prevention: leave the resting order in
                        // place and look past it.
                        self.stats.self_trades_skipped += 1;
                        i += 1;
                        continue;
                    }

                    let resting = &mut level.orders[i];
                    let qty = incoming.remaining().min(resting.remaining());

                    resting.filled += qty;
                    incoming.filled += qty;
                    matched_at_level = true;

                    let trade = Trade {
                        id: uuid::Uuid::new_v4().to_string(),
                        symbol: incoming.symbol.clone(),
                        price,
                        quantity: qty,
                        buy_order_id: if incoming.side == Side::Buy {
                            incoming.id.clone()
                        } else {
                            resting.id.clone()
                        },
                        sell_order_id: if incoming.side == Side::Sell {
                            incoming.id.clone()
                        } else {
                            resting.id.clone()
                        },
                        buyer_id: if incoming.side == Side::Buy {
                            incoming.owner_id.clone()
                        } else {
                            resting.owner_id.clone()
                        },
                        seller_id: if incoming.side == Side::Sell {
                            incoming.owner_id.clone()
                        } else {
                            resting.owner_id.clone()
                        },
                        timestamp: chrono::Utc::now(),
                    };

                    self.stats.fills += 1;
                    self.stats.total_volume += qty * price;

                    if resting.is_filled() {
                        let filled_id = resting.id.clone();
                        level.orders.remove(i);
                        self.orders.remove(&filled_id);
                        // Don't advance `i`: the next order shifted into it.
                    } else {
                        // incoming must now be exhausted (qty = min(..)).
                        i += 1;
                    }

                    push_bounded(&mut self.recent_trades, trade.clone(), trade_capacity);
                    trades.push(trade);
                }

                level_emptied = level.is_empty();
            }

            if level_emptied {
                self.level_for_side(contra_side).remove(&price);
            } else if !matched_at_level {
                // Nothing matched at this level (all self-trade skips) —
                // move on to the next level rather than spinning here
                //.
                continue 'levels;
            }
        }

        trades
    }

    fn insert_resting(&mut self, order: Order) {
        let side = order.side;
        let price = order.limit_price;
        let id = order.id.clone();
        self.orders.insert(id, OrderLocation { side, price });
        self.level_for_side(side)
            .entry(price)
            .or_default()
            .orders
            .push_back(order);
    }

    fn cancel(&mut self, order_id: &str) -> EngineResult<()> {
        let Some(location) = self.orders.remove(order_id) else {
            return Err(EngineError::NotFound(format!(
                "order {order_id} not found"
            )));
        };
        let book = self.level_for_side(location.side);
        if let Some(level) = book.get_mut(&location.price) {
            level.orders.retain(|o| o.id != order_id);
            if level.is_empty() {
                book.remove(&location.price);
            }
        }
        self.stats.orders_cancelled += 1;
        Ok(())
    }

    fn snapshot(&self, depth: Option<usize>) -> (Vec<BookLevel>, Vec<BookLevel>) {
        let take = depth.unwrap_or(usize::MAX);
        let bids = self
            .bids
            .iter()
            .rev()
            .take(take)
            .map(|(&price, level)| BookLevel {
                price,
                quantity: level.total_remaining(),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(take)
            .map(|(&price, level)| BookLevel {
                price,
                quantity: level.total_remaining(),
            })
            .collect();
        (bids, asks)
    }

    fn best_bid(&self) -> Option<Cents> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Cents> {
        self.asks.keys().next().copied()
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, capacity: usize) {
    ring.push_back(item);
    while ring.len() > capacity {
        ring.pop_front();
    }
}

fn validate(order: &Order) -> EngineResult<()> {
    if order.quantity <= 0 {
        return Err(EngineError::InvalidRequest(
            "quantity must be positive".into(),
        ));
    }
    if order.order_type == OrderType::Limit && order.limit_price <= 0 {
        return Err(EngineError::InvalidRequest(
            "limit price must be positive".into(),
        ));
    }
    Ok(())
}

/// A single-symbol order book. Submit/Cancel/snapshot readers are
/// serialized under one writer-priority lock (`parking_lot::RwLock`);
/// trade callbacks are invoked after the lock is released so a handler can
/// safely re-enter the book.
pub struct OrderBook {
    pub symbol: String,
    state: RwLock<BookState>,
    callbacks: RwLock<Vec<TradeCallback>>,
    trade_capacity: usize,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>, trade_capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            state: RwLock::new(BookState::new()),
            callbacks: RwLock::new(Vec::new()),
            trade_capacity,
        }
    }

    /// Register a trade observer. Observers are invoked in registration
    /// order, after every `submit`.
    pub fn on_trade(&self, callback: TradeCallback) {
        self.callbacks.write().push(callback);
    }

    /// Submit a new order. Never fails on the matching path;
    /// validation failures are rejected before entering the book.
    pub fn submit(&self, mut order: Order) -> EngineResult<Vec<Trade>> {
        validate(&order)?;
        order.symbol = self.symbol.clone();

        let trades = {
            let mut state = self.state.write();
            state.stats.orders_submitted += 1;
            let trades = state.match_order(&mut order, self.trade_capacity);
            if order.is_resting_eligible() {
                state.insert_resting(order);
            }
            trades
        };

        self.dispatch(&trades);
        Ok(trades)
    }

    fn dispatch(&self, trades: &[Trade]) {
        if trades.is_empty() {
            return;
        }
        let callbacks = self.callbacks.read().clone();
        for trade in trades {
            for cb in &callbacks {
                cb(trade);
            }
        }
    }

    pub fn cancel(&self, order_id: &str) -> EngineResult<()> {
        let result = self.state.write().cancel(order_id);
        if result.is_ok() {
            debug!(order_id, "order cancelled");
        }
        result
    }

    pub fn snapshot(&self, depth: Option<usize>) -> BookSnapshot {
        let (bids, asks) = self.state.read().snapshot(depth);
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids,
            asks,
        }
    }

    pub fn recent_trades(&self, n: usize) -> Vec<Trade> {
        let state = self.state.read();
        state
            .recent_trades
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn best_bid(&self) -> Option<Cents> {
        self.state.read().best_bid()
    }

    pub fn best_ask(&self) -> Option<Cents> {
        self.state.read().best_ask()
    }

    pub fn mid_price(&self) -> Option<Cents> {
        let state = self.state.read();
        match (state.best_bid(), state.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2),
            _ => None,
        }
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        let state = self.state.read();
        let location = state.orders.get(order_id)?;
        let book = match location.side {
            Side::Buy => &state.bids,
            Side::Sell => &state.asks,
        };
        book.get(&location.price)?
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    pub fn get_orders_by_user(&self, user_id: &str) -> Vec<Order> {
        let state = self.state.read();
        state
            .bids
            .values()
            .chain(state.asks.values())
            .flat_map(|level| level.orders.iter())
            .filter(|o| o.owner_id == user_id)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> MatchingStats {
        self.state.read().stats.clone()
    }

    pub fn cancel_all_for_user(&self, user_id: &str) {
        let ids: Vec<String> = self
            .get_orders_by_user(user_id)
            .into_iter()
            .map(|o| o.id)
            .collect();
        for id in ids {
            if let Err(e) = self.cancel(&id) {
                warn!(order_id = %id, error = %e, "cancel_all_for_user: order already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderType;

    fn limit(owner: &str, side: Side, price: Cents, qty: Qty) -> Order {
        Order::new(owner, "SIM", side, OrderType::Limit, price, qty)
    }

    fn market(owner: &str, side: Side, qty: Qty) -> Order {
        Order::new(owner, "SIM", side, OrderType::Market, 0, qty)
    }

    #[test]
    fn price_priority_best_price_first() {
        let book = OrderBook::new("SIM", 1000);
        book.submit(limit("expensive", Side::Sell, 10_100, 10))
            .unwrap();
        book.submit(limit("cheap", Side::Sell, 10_000, 10)).unwrap();

        let trades = book.submit(limit("buyer", Side::Buy, 10_100, 10)).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 10_000);
        assert_eq!(trades[0].buyer_id, "buyer");
        assert_eq!(trades[0].seller_id, "cheap");
        assert_eq!(book.best_ask(), Some(10_100));
    }

    #[test]
    fn partial_fill_leaves_remainder_resting() {
        let book = OrderBook::new("SIM", 1000);
        book.submit(limit("s", Side::Sell, 10_000, 20)).unwrap();
        let trades = book.submit(limit("b", Side::Buy, 10_000, 10)).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 10);
        let snap = book.snapshot(None);
        assert_eq!(snap.asks, vec![BookLevel { price: 10_000, quantity: 10 }]);
    }

    #[test]
    fn market_order_sweeps_two_levels() {
        let book = OrderBook::new("SIM", 1000);
        book.submit(limit("s1", Side::Sell, 10_000, 10)).unwrap();
        book.submit(limit("s2", Side::Sell, 10_100, 10)).unwrap();

        let trades = book.submit(market("taker", Side::Buy, 15)).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (10_000, 10));
        assert_eq!((trades[1].price, trades[1].quantity), (10_100, 5));
        let snap = book.snapshot(None);
        assert_eq!(snap.asks, vec![BookLevel { price: 10_100, quantity: 5 }]);
    }

    #[test]
    fn self_trade_is_skipped_not_cancelled() {
        let book = OrderBook::new("SIM", 1000);
        book.submit(limit("u", Side::Sell, 10_000, 10)).unwrap();
        book.submit(limit("v", Side::Sell, 10_000, 10)).unwrap();

        let trades = book.submit(limit("u", Side::Buy, 10_000, 10)).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].buyer_id, "u");
        assert_eq!(trades[0].seller_id, "v");
        // u's own resting sell is still in the book.
        let resting = book.get_orders_by_user("u");
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].side, Side::Sell);
    }

    #[test]
    fn market_order_into_empty_book_is_a_no_op() {
        let book = OrderBook::new("SIM", 1000);
        let trades = book.submit(market("taker", Side::Buy, 10)).unwrap();
        assert!(trades.is_empty());
        assert!(book.get_order("anything").is_none());
    }

    #[test]
    fn cancel_returns_book_to_pre_submission_state() {
        let book = OrderBook::new("SIM", 1000);
        let before = book.snapshot(None);
        let order = limit("b", Side::Buy, 10_000, 10);
        let id = order.id.clone();
        book.submit(order).unwrap();
        book.cancel(&id).unwrap();
        let after = book.snapshot(None);
        assert_eq!(before.bids, after.bids);
        assert_eq!(before.asks, after.asks);
    }

    #[test]
    fn cancel_unknown_id_is_not_found() {
        let book = OrderBook::new("SIM", 1000);
        let err = book.cancel("does-not-exist").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn earlier_order_at_same_price_matches_first() {
        let book = OrderBook::new("SIM", 1000);
        book.submit(limit("first", Side::Sell, 10_000, 5)).unwrap();
        book.submit(limit("second", Side::Sell, 10_000, 5)).unwrap();

        let trades = book.submit(limit("buyer", Side::Buy, 10_000, 5)).unwrap();
        assert_eq!(trades[0].seller_id, "first");
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let book = OrderBook::new("SIM", 1000);
        let err = book
            .submit(limit("b", Side::Buy, 10_000, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
}

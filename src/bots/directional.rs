//! Directional bots: momentum, mean reversion and breakout,
//! each trading market orders off the price-feed reference.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Bot, BotCore};
use crate::model::{Cents, Order, OrderType, Qty, Side, Trade};
use crate::pricefeed::PriceFeed;

/// Tracks current price against an older window entry; trades a market
/// order in the trend direction once the move exceeds `threshold_cents`.
pub struct MomentumBot {
    core: BotCore,
    feed: Arc<PriceFeed>,
    interval: Duration,
    lookback: usize,
    threshold_cents: Cents,
    order_size: Qty,
    max_position: Qty,
    window: Mutex<VecDeque<Cents>>,
}

impl MomentumBot {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        feed: Arc<PriceFeed>,
        interval: Duration,
        lookback: usize,
        threshold_cents: Cents,
        order_size: Qty,
        max_position: Qty,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            feed,
            interval,
            lookback,
            threshold_cents,
            order_size,
            max_position,
            window: Mutex::new(VecDeque::with_capacity(lookback)),
        })
    }

    fn on_price(&self, price: Cents) -> Option<Side> {
        let mut window = self.window.lock();
        window.push_back(price);
        while window.len() > self.lookback {
            window.pop_front();
        }
        let oldest = *window.front()?;
        let delta = price - oldest;
        if delta.unsigned_abs() as Cents < self.threshold_cents {
            return None;
        }
        let inventory = self.core.position_qty();
        if delta > 0 && inventory < self.max_position {
            Some(Side::Buy)
        } else if delta < 0 && inventory > -self.max_position {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

#[async_trait]
impl Bot for MomentumBot {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let (_id, mut ticks) = self.feed.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        let mut last_price: Option<Cents> = None;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
                tick = ticks.recv() => {
                    match tick {
                        Some(t) => last_price = Some(t.book_mid),
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    if let Some(price) = last_price {
                        if let Some(side) = self.on_price(price) {
                            let _ = self.core.submit(Order::new(
                                self.core.id.clone(), "SIM", side, OrderType::Market, 0, self.order_size,
                            ));
                        }
                    }
                }
            }
        }
    }

    fn process_trade(&self, trade: &Trade) {
        self.core.record_trade(trade);
    }
}

/// Maintains a slow EMA reference and trades against wide deviations from it.
pub struct MeanReversionBot {
    core: BotCore,
    feed: Arc<PriceFeed>,
    interval: Duration,
    threshold_cents: Cents,
    order_size: Qty,
    ema_ref: Mutex<Option<f64>>,
}

impl MeanReversionBot {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        feed: Arc<PriceFeed>,
        interval: Duration,
        threshold_cents: Cents,
        order_size: Qty,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            feed,
            interval,
            threshold_cents,
            order_size,
            ema_ref: Mutex::new(None),
        })
    }

    fn on_price(&self, nav: Cents) -> Option<Side> {
        let mut ema = self.ema_ref.lock();
        let reference = match *ema {
            Some(prev) => 0.99 * prev + 0.01 * nav as f64,
            None => nav as f64,
        };
        *ema = Some(reference);

        let deviation = nav as f64 - reference;
        if deviation.abs() < self.threshold_cents as f64 {
            return None;
        }
        // Trade against the deviation: price above reference -> sell.
        Some(if deviation > 0.0 { Side::Sell } else { Side::Buy })
    }
}

#[async_trait]
impl Bot for MeanReversionBot {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let (_id, mut ticks) = self.feed.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        let mut last_nav: Option<Cents> = None;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
                tick = ticks.recv() => {
                    match tick {
                        Some(t) => last_nav = Some(t.nav),
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    if let Some(nav) = last_nav {
                        if let Some(side) = self.on_price(nav) {
                            let _ = self.core.submit(Order::new(
                                self.core.id.clone(), "SIM", side, OrderType::Market, 0, self.order_size,
                            ));
                        }
                    }
                }
            }
        }
    }

    fn process_trade(&self, trade: &Trade) {
        self.core.record_trade(trade);
    }
}

/// Trades the breakout beyond the last `window` prices' high/low, then
/// cools down for `cooldown_ticks`.
pub struct BreakoutBot {
    core: BotCore,
    feed: Arc<PriceFeed>,
    interval: Duration,
    window: usize,
    multiplier: f64,
    order_size: Qty,
    cooldown_ticks: u32,
    prices: Mutex<VecDeque<Cents>>,
}

impl BreakoutBot {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        feed: Arc<PriceFeed>,
        interval: Duration,
        window: usize,
        multiplier: f64,
        order_size: Qty,
        cooldown_ticks: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            feed,
            interval,
            window,
            multiplier,
            order_size,
            cooldown_ticks,
            prices: Mutex::new(VecDeque::with_capacity(window)),
        })
    }

    fn on_price(&self, price: Cents) -> Option<Side> {
        let mut prices = self.prices.lock();
        let (high, low) = prices
            .iter()
            .fold((Cents::MIN, Cents::MAX), |(h, l), &p| (h.max(p), l.min(p)));
        prices.push_back(price);
        while prices.len() > self.window {
            prices.pop_front();
        }
        if prices.len() < self.window {
            return None;
        }
        let range = (high - low).max(1);
        let up_break = price as f64 > high as f64 + self.multiplier * range as f64;
        let down_break = (price as f64) < low as f64 - self.multiplier * range as f64;
        if up_break {
            Some(Side::Buy)
        } else if down_break {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

#[async_trait]
impl Bot for BreakoutBot {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let (_id, mut ticks) = self.feed.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        let mut last_price: Option<Cents> = None;
        let mut cooldown_remaining: u32 = 0;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
                tick = ticks.recv() => {
                    match tick {
                        Some(t) => last_price = Some(t.book_mid),
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    if cooldown_remaining > 0 {
                        cooldown_remaining -= 1;
                        continue;
                    }
                    if let Some(price) = last_price {
                        if let Some(side) = self.on_price(price) {
                            let _ = self.core.submit(Order::new(
                                self.core.id.clone(), "SIM", side, OrderType::Market, 0, self.order_size,
                            ));
                            cooldown_remaining = self.cooldown_ticks;
                        }
                    }
                }
            }
        }
    }

    fn process_trade(&self, trade: &Trade) {
        self.core.record_trade(trade);
    }
}

//! Noise and panic bots: randomized low-signal flow and a
//! reactive panic-seller/buyer triggered by sharp price moves.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;

use super::{Bot, BotCore};
use crate::model::{Cents, Order, OrderType, Qty, Side, Trade};
use crate::pricefeed::PriceFeed;

/// Randomized arrivals (Poisson-like via exponential inter-arrival times),
/// random size and side with an optional bias, always market orders.
pub struct NoiseTrader {
    core: BotCore,
    mean_interval: Duration,
    min_size: Qty,
    max_size: Qty,
    /// Probability in [0,1] of a buy; 0.5 is unbiased.
    buy_bias: f64,
}

impl NoiseTrader {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        mean_interval: Duration,
        min_size: Qty,
        max_size: Qty,
        buy_bias: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            mean_interval,
            min_size,
            max_size,
            buy_bias,
        })
    }

    fn next_arrival(&self) -> Duration {
        // Exponential inter-arrival time with the configured mean.
        let u: f64 = rand::thread_rng().gen_range(f64::EPSILON..1.0);
        let secs = -self.mean_interval.as_secs_f64() * u.ln();
        Duration::from_secs_f64(secs.clamp(0.01, 60.0))
    }
}

#[async_trait]
impl Bot for NoiseTrader {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            let wait = self.next_arrival();
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
                _ = tokio::time::sleep(wait) => {
                    let mut rng = rand::thread_rng();
                    let size = rng.gen_range(self.min_size..=self.max_size);
                    let side = if rng.gen_bool(self.buy_bias) { Side::Buy } else { Side::Sell };
                    let _ = self.core.submit(Order::new(
                        self.core.id.clone(), "SIM", side, OrderType::Market, 0, size,
                    ));
                }
            }
        }
    }

    fn process_trade(&self, trade: &Trade) {
        self.core.record_trade(trade);
    }
}

/// Reacts to sharp price jumps with a market order in the direction of
/// the move, then enforces a cooldown before reacting again.
pub struct PanicBot {
    core: BotCore,
    feed: Arc<PriceFeed>,
    threshold_cents: Cents,
    cooldown: Duration,
    order_size: Qty,
    last_price: Mutex<Option<Cents>>,
    cooldown_until: Mutex<Option<Instant>>,
}

impl PanicBot {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        feed: Arc<PriceFeed>,
        threshold_cents: Cents,
        cooldown: Duration,
        order_size: Qty,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            feed,
            threshold_cents,
            cooldown,
            order_size,
            last_price: Mutex::new(None),
            cooldown_until: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Bot for PanicBot {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let (_id, mut ticks) = self.feed.subscribe();
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
                tick = ticks.recv() => {
                    let Some(tick) = tick else { break };
                    let price = tick.nav;
                    let mut last_price = self.last_price.lock();
                    let previous = *last_price;
                    *last_price = Some(price);
                    drop(last_price);

                    let Some(previous) = previous else { continue };
                    let delta = price - previous;
                    if delta.unsigned_abs() as Cents < self.threshold_cents {
                        continue;
                    }

                    let mut cooldown_until = self.cooldown_until.lock();
                    if cooldown_until.map(|until| Instant::now() < until).unwrap_or(false) {
                        continue;
                    }
                    *cooldown_until = Some(Instant::now() + self.cooldown);
                    drop(cooldown_until);

                    let side = if delta > 0 { Side::Buy } else { Side::Sell };
                    let _ = self.core.submit(Order::new(
                        self.core.id.clone(), "SIM", side, OrderType::Market, 0, self.order_size,
                    ));
                }
            }
        }
    }

    fn process_trade(&self, trade: &Trade) {
        self.core.record_trade(trade);
    }
}

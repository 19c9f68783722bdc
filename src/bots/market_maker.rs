//! Market-making bots: symmetric quote ladders around the
//! MM-fuzzed price-feed reference, with inventory skew and an optional
//! volatility-widening and nervous-pull rule.
//!
//! Grid-laddering plus inventory-skew quoting (`compute_quote_grid`),
//! expressed in this crate's integer-cents/share model with a
//! configurable `levels` ladder rather than a fixed 3-layer grid.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Bot, BotCore};
use crate::model::{Cents, Order, OrderType, Qty, Side, Trade};
use crate::pricefeed::PriceFeed;

const VOLATILITY_WINDOW: usize = 20;
const NERVOUS_JUMP_THRESHOLD_CENTS: Cents = 20;
const NERVOUS_QUIET_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmPreset {
    Tight,
    Wide,
    Adaptive,
    Nervous,
}

#[derive(Debug, Clone, Copy)]
pub struct MmParams {
    pub spread_cents: Cents,
    pub size_per_level: Qty,
    pub levels: u32,
    pub requote_interval: Duration,
    pub max_position: Qty,
    pub skew_coefficient: f64,
    pub widen_on_volatility: bool,
    pub nervous: bool,
}

impl MmPreset {
    pub fn params(self) -> MmParams {
        match self {
            MmPreset::Tight => MmParams {
                spread_cents: 5,
                size_per_level: 20,
                levels: 3,
                requote_interval: Duration::from_millis(500),
                max_position: 500,
                skew_coefficient: 0.5,
                widen_on_volatility: true,
                nervous: false,
            },
            MmPreset::Wide => MmParams {
                spread_cents: 25,
                size_per_level: 200,
                levels: 3,
                requote_interval: Duration::from_secs(2),
                max_position: 2_000,
                skew_coefficient: 0.2,
                widen_on_volatility: false,
                nervous: false,
            },
            MmPreset::Adaptive => MmParams {
                spread_cents: 10,
                size_per_level: 50,
                levels: 4,
                requote_interval: Duration::from_secs(1),
                max_position: 1_000,
                skew_coefficient: 0.8,
                widen_on_volatility: true,
                nervous: false,
            },
            MmPreset::Nervous => MmParams {
                spread_cents: 10,
                size_per_level: 30,
                levels: 2,
                requote_interval: Duration::from_secs(1),
                max_position: 300,
                skew_coefficient: 1.0,
                widen_on_volatility: true,
                nervous: true,
            },
        }
    }
}

pub struct MarketMaker {
    core: BotCore,
    feed: Arc<PriceFeed>,
    params: MmParams,
    recent_abs_changes: Mutex<VecDeque<f64>>,
}

impl MarketMaker {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        feed: Arc<PriceFeed>,
        preset: MmPreset,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            feed,
            params: preset.params(),
            recent_abs_changes: Mutex::new(VecDeque::with_capacity(VOLATILITY_WINDOW)),
        })
    }

    fn rolling_avg_abs_change(&self, reference: Cents, last_reference: Option<Cents>) -> Cents {
        if let Some(last) = last_reference {
            let mut changes = self.recent_abs_changes.lock();
            changes.push_back((reference - last).unsigned_abs() as f64);
            while changes.len() > VOLATILITY_WINDOW {
                changes.pop_front();
            }
            let avg = changes.iter().sum::<f64>() / changes.len() as f64;
            avg.round() as Cents
        } else {
            0
        }
    }

    fn requote(&self, reference: Cents, widen_cents: Cents) {
        self.core.cancel_all();

        let inventory = self.core.position_qty();
        let effective_spread = if self.params.widen_on_volatility {
            self.params.spread_cents + widen_cents
        } else {
            self.params.spread_cents
        };
        let skew = (inventory as f64 * self.params.skew_coefficient).round() as Cents;

        let suppress_bids = inventory >= self.params.max_position;
        let suppress_asks = inventory <= -self.params.max_position;

        for level in 1..=self.params.levels as i64 {
            if !suppress_bids {
                let price = reference - effective_spread * level - skew;
                if price > 0 {
                    let _ = self.core.submit(Order::new(
                        self.core.id.clone(),
                        "SIM",
                        Side::Buy,
                        OrderType::Limit,
                        price,
                        self.params.size_per_level,
                    ));
                }
            }
            if !suppress_asks {
                let price = reference + effective_spread * level - skew;
                if price > 0 {
                    let _ = self.core.submit(Order::new(
                        self.core.id.clone(),
                        "SIM",
                        Side::Sell,
                        OrderType::Limit,
                        price,
                        self.params.size_per_level,
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl Bot for MarketMaker {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let (_sub_id, mut ticks) = self.feed.subscribe();
        let mut interval = tokio::time::interval(self.params.requote_interval);
        let mut last_reference: Option<Cents> = None;
        let mut quiet_until: Option<Instant> = None;
        let mut reference: Cents = 0;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                tick = ticks.recv() => {
                    match tick {
                        Some(t) => reference = t.mm_reference,
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    let widen = self.rolling_avg_abs_change(reference, last_reference);

                    if self.params.nervous {
                        let jumped = last_reference
                            .map(|last| (reference - last).unsigned_abs() as Cents > NERVOUS_JUMP_THRESHOLD_CENTS)
                            .unwrap_or(false);
                        if jumped {
                            self.core.cancel_all();
                            quiet_until = Some(Instant::now() + NERVOUS_QUIET_PERIOD);
                        }
                        if quiet_until.map(|until| Instant::now() < until).unwrap_or(false) {
                            last_reference = Some(reference);
                            continue;
                        }
                    }

                    self.requote(reference, widen);
                    last_reference = Some(reference);
                }
            }
        }

        self.core.cancel_all();
    }

    fn process_trade(&self, trade: &Trade) {
        self.core.record_trade(trade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_have_expected_parameters() {
        let tight = MmPreset::Tight.params();
        assert_eq!(tight.spread_cents, 5);
        assert_eq!(tight.size_per_level, 20);
        assert_eq!(tight.levels, 3);
        assert_eq!(tight.max_position, 500);

        let wide = MmPreset::Wide.params();
        assert_eq!(wide.spread_cents, 25);
        assert!(!wide.widen_on_volatility);

        let nervous = MmPreset::Nervous.params();
        assert!(nervous.nervous);
    }

    #[tokio::test]
    async fn requote_produces_symmetric_ladder_around_reference() {
        let book = Arc::new(crate::book::OrderBook::new("SIM", 100));
        let feed = PriceFeed::new(book.clone());
        let mm = MarketMaker::new("mm1", book.clone(), feed, MmPreset::Tight);

        mm.requote(10_000, 0);

        let snapshot = book.snapshot(None);
        assert_eq!(snapshot.bids.len(), 3);
        assert_eq!(snapshot.asks.len(), 3);
        assert!(snapshot.best_bid().unwrap() < 10_000);
        assert!(snapshot.best_ask().unwrap() > 10_000);
    }

    #[tokio::test]
    async fn inventory_skew_suppresses_bids_past_max_position() {
        let book = Arc::new(crate::book::OrderBook::new("SIM", 100));
        let feed = PriceFeed::new(book.clone());
        let mm = MarketMaker::new("mm1", book.clone(), feed, MmPreset::Tight);

        // Force the bot long past max_position by crediting a fake fill.
        mm.core
            .record_trade(&Trade {
                id: "t1".into(),
                symbol: "SIM".into(),
                price: 10_000,
                quantity: 600,
                buy_order_id: "o1".into(),
                sell_order_id: "o2".into(),
                buyer_id: "mm1".into(),
                seller_id: "someone".into(),
                timestamp: chrono::Utc::now(),
            });

        mm.requote(10_000, 0);
        let snapshot = book.snapshot(None);
        assert!(snapshot.bids.is_empty());
        assert!(!snapshot.asks.is_empty());
    }
}

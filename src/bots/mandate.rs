//! Mandated execution agents: TWAP, opportunistic and
//! desperate agents, differing only in `urgency0` and `deadline` — all
//! share the same urgency-escalation slicing logic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Bot, BotCore};
use crate::model::{Order, OrderType, Qty, Side, Trade};

const SLICE_INTERVAL: Duration = Duration::from_secs(5);
const MID_OFFSET_CENTS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MandateKind {
    Twap,
    Opportunistic,
    Desperate,
}

/// Works a signed quota `q` (sign = direction) down to zero by `deadline`,
/// escalating urgency as time outpaces fill progress.
pub struct MandateAgent {
    core: BotCore,
    kind: MandateKind,
    quota: Qty,
    deadline: Duration,
    urgency0: f64,
    started_at: Mutex<Option<Instant>>,
    filled: Mutex<Qty>,
}

impl MandateAgent {
    pub fn new(
        id: impl Into<String>,
        book: Arc<crate::book::OrderBook>,
        kind: MandateKind,
        quota: Qty,
        deadline: Duration,
        urgency0: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: BotCore::new(id, book),
            kind,
            quota,
            deadline,
            urgency0,
            started_at: Mutex::new(None),
            filled: Mutex::new(0),
        })
    }

    fn direction(&self) -> Side {
        if self.quota >= 0 { Side::Buy } else { Side::Sell }
    }

    fn base_slice(&self) -> Qty {
        let slices = (self.deadline.as_secs_f64() / SLICE_INTERVAL.as_secs_f64()).max(1.0);
        (self.quota.unsigned_abs() as f64 / slices).ceil() as Qty
    }

    /// Fraction of quota filled so far, in [0,1].
    pub fn progress(&self) -> f64 {
        let filled = *self.filled.lock();
        if self.quota == 0 {
            1.0
        } else {
            (filled.unsigned_abs() as f64 / self.quota.unsigned_abs() as f64).min(1.0)
        }
    }

    fn current_urgency(&self, elapsed: Duration) -> f64 {
        let time_progress = (elapsed.as_secs_f64() / self.deadline.as_secs_f64()).min(1.0);
        let fill_progress = self.progress();
        (self.urgency0 + (time_progress - fill_progress).max(0.0)).clamp(0.0, 1.0)
    }

    fn remaining(&self) -> Qty {
        self.quota.unsigned_abs() as Qty - self.filled.lock().unsigned_abs() as Qty
    }
}

#[async_trait]
impl Bot for MandateAgent {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        *self.started_at.lock() = Some(Instant::now());
        let mut interval = tokio::time::interval(SLICE_INTERVAL);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
                _ = interval.tick() => {
                    if self.remaining() <= 0 {
                        break;
                    }
                    let elapsed = self.started_at.lock().map(|t| t.elapsed()).unwrap_or_default();
                    let urgency = self.current_urgency(elapsed);
                    let mut slice = self.base_slice().min(self.remaining());
                    if urgency > 0.7 {
                        slice = (slice * 2).min(self.remaining());
                    }

                    let side = self.direction();
                    let order = if urgency > 0.8 {
                        Order::new(self.core.id.clone(), "SIM", side, OrderType::Market, 0, slice)
                    } else {
                        let best = match side {
                            Side::Buy => self.core.book.best_bid(),
                            Side::Sell => self.core.book.best_ask(),
                        };
                        let mid = self.core.book.mid_price().or(best).unwrap_or(0);
                        let price = match side {
                            Side::Buy => mid - MID_OFFSET_CENTS,
                            Side::Sell => mid + MID_OFFSET_CENTS,
                        };
                        Order::new(self.core.id.clone(), "SIM", side, OrderType::Limit, price.max(1), slice)
                    };

                    let _ = self.core.submit(order);
                }
            }
        }
    }

    fn process_trade(&self, trade: &Trade) {
        let is_mine = trade.buyer_id == self.core.id || trade.seller_id == self.core.id;
        if is_mine {
            *self.filled.lock() += trade.quantity;
        }
        self.core.record_trade(trade);
    }
}

pub fn twap(
    id: impl Into<String>,
    book: Arc<crate::book::OrderBook>,
    quota: Qty,
    deadline: Duration,
) -> Arc<MandateAgent> {
    MandateAgent::new(id, book, MandateKind::Twap, quota, deadline, 0.2)
}

pub fn opportunistic(
    id: impl Into<String>,
    book: Arc<crate::book::OrderBook>,
    quota: Qty,
    deadline: Duration,
) -> Arc<MandateAgent> {
    MandateAgent::new(id, book, MandateKind::Opportunistic, quota, deadline, 0.0)
}

pub fn desperate(
    id: impl Into<String>,
    book: Arc<crate::book::OrderBook>,
    quota: Qty,
    deadline: Duration,
) -> Arc<MandateAgent> {
    MandateAgent::new(id, book, MandateKind::Desperate, quota, deadline, 0.6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_slice_divides_quota_by_interval_count() {
        let book = Arc::new(crate::book::OrderBook::new("SIM", 10));
        let agent = twap("t1", book, 1_000, Duration::from_secs(50));
        assert_eq!(agent.base_slice(), 100);
    }

    #[test]
    fn progress_tracks_filled_against_quota() {
        let book = Arc::new(crate::book::OrderBook::new("SIM", 10));
        let agent = twap("t1", book, 1_000, Duration::from_secs(50));
        assert_eq!(agent.progress(), 0.0);
        *agent.filled.lock() = 500;
        assert_eq!(agent.progress(), 0.5);
    }

    #[test]
    fn urgency_escalates_when_time_outpaces_fill() {
        let book = Arc::new(crate::book::OrderBook::new("SIM", 10));
        let agent = twap("t1", book, 1_000, Duration::from_secs(50));
        let urgency = agent.current_urgency(Duration::from_secs(45));
        assert!(urgency > agent.urgency0);
    }
}

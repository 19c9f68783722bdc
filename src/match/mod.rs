//! Match lifecycle engine: the LOBBY → PRE_MATCH →
//! TRADING → SETTLEMENT → COMPLETE state machine, participant roster, the
//! 100ms price-tick loop and settlement/ranking.
//!
//! A single struct wiring a clock, a book and participant state through an
//! explicit state machine, with one authoritative time source. Here the
//! clock is [`crate::timescaler::TimeScaler`] and the lock/dispatch
//! discipline follows [`crate::book::OrderBook`]: mutate under the write
//! lock, copy callbacks, then notify after releasing it.

mod participant;

pub use participant::Participant;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::historical::NormalizedDay;
use crate::model::{Cents, Qty};
use crate::timescaler::TimeScaler;

pub const STARTING_SHARE_FRACTION_MIN: f64 = 0.20;
pub const STARTING_SHARE_FRACTION_MAX: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    Lobby,
    PreMatch,
    Trading,
    Settlement,
    Complete,
}

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub symbol: String,
    pub duration_min: u32,
    pub target_nav: Cents,
    pub starting_account_value: Cents,
    pub pre_match_countdown_secs: u64,
}

/// A NAV observation published once per tick while TRADING. This is the
/// match engine's contribution to the richer [`crate::pricefeed::PriceTick`]
/// (which additionally blends in book mid and the MM-fuzzed reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavUpdate {
    pub timestamp: DateTime<Utc>,
    pub nav: Cents,
    pub bar_index: usize,
    pub market_time: String,
    pub progress: f64,
}

pub type PriceTickCallback = Arc<dyn Fn(&NavUpdate) + Send + Sync>;
pub type StateChangeCallback = Arc<dyn Fn(MatchState) + Send + Sync>;

struct MatchInner {
    id: String,
    config: MatchConfig,
    day: Option<NormalizedDay>,
    scaler: TimeScaler,
    state: MatchState,
    current_nav: Cents,
    current_bar_index: usize,
    participants: Vec<Participant>,
    settled: bool,
}

/// The match lifecycle engine. Cheap to clone via `Arc`; intended to be
/// shared between the HTTP/websocket layer and the background tick task.
pub struct MatchEngine {
    inner: RwLock<MatchInner>,
    price_tick_callbacks: RwLock<Vec<PriceTickCallback>>,
    state_callbacks: RwLock<Vec<StateChangeCallback>>,
}

impl MatchEngine {
    pub fn new(id: impl Into<String>, config: MatchConfig) -> Arc<Self> {
        let duration_min = config.duration_min;
        Arc::new(Self {
            inner: RwLock::new(MatchInner {
                id: id.into(),
                config,
                day: None,
                scaler: TimeScaler::new(duration_min),
                state: MatchState::Lobby,
                current_nav: 0,
                current_bar_index: 0,
                participants: Vec::new(),
                settled: false,
            }),
            price_tick_callbacks: RwLock::new(Vec::new()),
            state_callbacks: RwLock::new(Vec::new()),
        })
    }

    pub fn id(&self) -> String {
        self.inner.read().id.clone()
    }

    pub fn state(&self) -> MatchState {
        self.inner.read().state
    }

    pub fn on_price_tick(&self, callback: PriceTickCallback) {
        self.price_tick_callbacks.write().push(callback);
    }

    pub fn on_state_change(&self, callback: StateChangeCallback) {
        self.state_callbacks.write().push(callback);
    }

    fn dispatch_state_change(&self, state: MatchState) {
        let callbacks = self.state_callbacks.read().clone();
        for cb in callbacks.iter() {
            cb(state);
        }
    }

    fn dispatch_nav_update(&self, update: &NavUpdate) {
        let callbacks = self.price_tick_callbacks.read().clone();
        for cb in callbacks.iter() {
            cb(update);
        }
    }

    /// Assign the trading day. Only legal in LOBBY; the day is the guard
    /// that unlocks the LOBBY → PRE_MATCH transition.
    pub fn set_day(&self, day: NormalizedDay) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if inner.state != MatchState::Lobby {
            return Err(EngineError::InvalidState(
                "day can only be assigned in LOBBY".into(),
            ));
        }
        inner.day = Some(day);
        Ok(())
    }

    /// Join with a uniformly sampled starting-position fraction.
    pub fn join(&self, player_id: impl Into<String>, account_id: impl Into<String>) -> EngineResult<()> {
        let fraction = rand::thread_rng().gen_range(STARTING_SHARE_FRACTION_MIN..STARTING_SHARE_FRACTION_MAX);
        self.join_with_fraction(player_id, account_id, fraction)
    }

    /// Join with an explicit fraction — the general entry point `join`
    /// delegates here after sampling; tests call this directly for
    /// deterministic starting positions.
    pub fn join_with_fraction(
        &self,
        player_id: impl Into<String>,
        account_id: impl Into<String>,
        fraction: f64,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if !matches!(inner.state, MatchState::Lobby | MatchState::PreMatch) {
            return Err(EngineError::InvalidState(
                "join is only accepted in LOBBY or PRE_MATCH".into(),
            ));
        }
        let starting_value = inner.config.starting_account_value;
        let target_nav = inner.config.target_nav;
        let participant = Participant::new(player_id, account_id, starting_value, target_nav, fraction);
        inner.participants.push(participant);
        Ok(())
    }

    /// Leave is only accepted in LOBBY.
    pub fn leave(&self, player_id: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if inner.state != MatchState::Lobby {
            return Err(EngineError::InvalidState(
                "leave is only accepted in LOBBY".into(),
            ));
        }
        let before = inner.participants.len();
        inner.participants.retain(|p| p.player_id != player_id);
        if inner.participants.len() == before {
            return Err(EngineError::NotFound(format!("no such participant: {player_id}")));
        }
        Ok(())
    }

    pub fn transition_to_pre_match(&self) -> EngineResult<()> {
        {
            let mut inner = self.inner.write();
            if inner.state != MatchState::Lobby {
                return Err(EngineError::InvalidState("not in LOBBY".into()));
            }
            if inner.day.is_none() {
                return Err(EngineError::InvalidState("day must be set before PRE_MATCH".into()));
            }
            inner.state = MatchState::PreMatch;
        }
        info!(match_id = %self.id(), "transitioned to PRE_MATCH");
        self.dispatch_state_change(MatchState::PreMatch);
        Ok(())
    }

    pub fn start_trading(&self) -> EngineResult<()> {
        {
            let mut inner = self.inner.write();
            if inner.state != MatchState::PreMatch {
                return Err(EngineError::InvalidState("not in PRE_MATCH".into()));
            }
            inner.scaler.start();
            inner.current_bar_index = 0;
            inner.current_nav = inner
                .day
                .as_ref()
                .map(|d| d.bar(0).open)
                .unwrap_or(inner.config.target_nav);
            inner.state = MatchState::Trading;
        }
        info!(match_id = %self.id(), "transitioned to TRADING");
        self.dispatch_state_change(MatchState::Trading);
        Ok(())
    }

    /// One price-tick iteration. No-op outside TRADING. Updates
    /// NAV/bar index under the write lock, then notifies outside it.
    pub fn tick(&self) {
        let (nav_update, transitioned) = {
            let mut inner = self.inner.write();
            if inner.state != MatchState::Trading {
                return;
            }

            if inner.scaler.is_complete() {
                let final_nav = inner
                    .day
                    .as_ref()
                    .map(|d| d.bar(crate::historical::BARS_PER_DAY - 1).close)
                    .unwrap_or(inner.current_nav);
                inner.current_nav = final_nav;
                inner.current_bar_index = crate::historical::BARS_PER_DAY - 1;
                inner.state = MatchState::Settlement;

                let update = NavUpdate {
                    timestamp: Utc::now(),
                    nav: inner.current_nav,
                    bar_index: inner.current_bar_index,
                    market_time: inner.scaler.market_time_string(),
                    progress: 1.0,
                };
                (update, true)
            } else {
                let bar_index = inner.scaler.current_bar_index();
                let fraction = inner.scaler.bar_fraction();
                let nav = inner
                    .day
                    .as_ref()
                    .map(|d| {
                        let bar = d.bar(bar_index);
                        bar.open + ((bar.close - bar.open) as f64 * fraction).round() as i64
                    })
                    .unwrap_or(inner.current_nav);

                inner.current_nav = nav;
                inner.current_bar_index = bar_index;

                let update = NavUpdate {
                    timestamp: Utc::now(),
                    nav,
                    bar_index,
                    market_time: inner.scaler.market_time_string(),
                    progress: inner.scaler.progress(),
                };
                (update, false)
            }
        };

        self.dispatch_nav_update(&nav_update);
        if transitioned {
            info!(match_id = %self.id(), "transitioned to SETTLEMENT");
            self.dispatch_state_change(MatchState::Settlement);
        }
    }

    /// Background 100ms tick loop. Spawn with `tokio::spawn` and let it
    /// exit naturally once the match reaches SETTLEMENT.
    pub async fn run_price_tick_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            if self.state() != MatchState::Trading {
                break;
            }
            self.tick();
        }
    }

    /// Settle with a position fetcher `playerId -> (cash, shares)`.
    /// Idempotent: a second call after the first is a no-op.
    pub fn settle(&self, position_fetcher: impl Fn(&str) -> (Cents, Qty)) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if inner.settled {
            return Ok(());
        }
        if inner.state != MatchState::Settlement {
            return Err(EngineError::InvalidState("not in SETTLEMENT".into()));
        }

        let current_nav = inner.current_nav;
        for participant in inner.participants.iter_mut() {
            let (cash, shares) = position_fetcher(&participant.player_id);
            participant.settle(cash, shares, current_nav);
        }

        // Stable sort descending by P&L; ties keep join order.
        let mut indices: Vec<usize> = (0..inner.participants.len()).collect();
        indices.sort_by(|&a, &b| {
            inner.participants[b]
                .pnl
                .unwrap_or(i64::MIN)
                .cmp(&inner.participants[a].pnl.unwrap_or(i64::MIN))
        });
        for (rank, idx) in indices.into_iter().enumerate() {
            inner.participants[idx].rank = Some(rank as u32 + 1);
        }

        inner.state = MatchState::Complete;
        inner.settled = true;
        drop(inner);

        info!(match_id = %self.id(), "transitioned to COMPLETE");
        self.dispatch_state_change(MatchState::Complete);
        Ok(())
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.inner.read().participants.clone()
    }

    pub fn participant(&self, player_id: &str) -> Option<Participant> {
        self.inner
            .read()
            .participants
            .iter()
            .find(|p| p.player_id == player_id)
            .cloned()
    }

    pub fn current_nav(&self) -> Cents {
        self.inner.read().current_nav
    }

    pub fn current_bar_index(&self) -> usize {
        self.inner.read().current_bar_index
    }

    pub fn config(&self) -> MatchConfig {
        self.inner.read().config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_day(open: i64, close: i64) -> NormalizedDay {
        use crate::historical::{OhlcvBar, TradingDay, BARS_PER_DAY};
        let mut bars = vec![
            OhlcvBar {
                open,
                high: open,
                low: open,
                close: open,
                volume: 0,
            };
            BARS_PER_DAY
        ];
        bars[BARS_PER_DAY - 1].close = close;
        let day = TradingDay::new("SIM", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), bars);
        NormalizedDay::normalize(day, open)
    }

    fn test_config() -> MatchConfig {
        MatchConfig {
            symbol: "SIM".into(),
            duration_min: 10,
            target_nav: 10_000,
            starting_account_value: 100_000_000,
            pre_match_countdown_secs: 15,
        }
    }

    #[test]
    fn lobby_join_then_pre_match_requires_day() {
        let m = MatchEngine::new("m1", test_config());
        m.join_with_fraction("p1", "a1", 0.5).unwrap();
        assert!(m.transition_to_pre_match().is_err());

        m.set_day(test_day(10_000, 11_000)).unwrap();
        m.transition_to_pre_match().unwrap();
        assert_eq!(m.state(), MatchState::PreMatch);
    }

    #[test]
    fn join_rejected_once_trading_begins() {
        let m = MatchEngine::new("m1", test_config());
        m.set_day(test_day(10_000, 11_000)).unwrap();
        m.transition_to_pre_match().unwrap();
        m.start_trading().unwrap();

        assert!(m.join_with_fraction("late", "a2", 0.5).is_err());
    }

    #[test]
    fn starting_position_matches_fraction_formula() {
        let m = MatchEngine::new("m1", test_config());
        m.join_with_fraction("p1", "a1", 0.5).unwrap();
        let p = m.participant("p1").unwrap();

        // starting_value = 100_000_000, target_nav = 10_000, fraction 0.5
        assert_eq!(p.starting_shares, 5_000);
        assert_eq!(p.starting_cash, 100_000_000 - 5_000 * 10_000);
        assert_eq!(p.starting_value, 100_000_000);
    }

    #[test]
    fn settlement_ranks_by_pnl_and_is_idempotent() {
        let m = MatchEngine::new("m1", test_config());
        m.join_with_fraction("p1", "a1", 0.5).unwrap();
        m.join_with_fraction("p2", "a2", 0.5).unwrap();
        m.set_day(test_day(10_000, 10_000)).unwrap();
        m.transition_to_pre_match().unwrap();
        m.start_trading().unwrap();

        // Force straight into SETTLEMENT without waiting on real time.
        {
            let mut inner = m.inner.write();
            inner.state = MatchState::Settlement;
            inner.current_nav = 10_000;
        }

        let starting_value = m.participant("p1").unwrap().starting_value;
        m.settle(move |player_id| match player_id {
            "p1" => (starting_value + 500_000, 0),
            _ => (starting_value - 300_000, 0),
        })
        .unwrap();

        let p1 = m.participant("p1").unwrap();
        let p2 = m.participant("p2").unwrap();
        assert_eq!(p1.pnl.unwrap(), 500_000);
        assert_eq!(p2.pnl.unwrap(), -300_000);
        assert_eq!(p1.rank, Some(1));
        assert_eq!(p2.rank, Some(2));

        // Second settle call is a no-op.
        m.settle(|_| (0, 0)).unwrap();
        assert_eq!(m.participant("p1").unwrap().rank, Some(2));
    }

    #[test]
    fn leave_only_accepted_in_lobby() {
        let m = MatchEngine::new("m1", test_config());
        m.join_with_fraction("p1", "a1", 0.5).unwrap();
        m.set_day(test_day(10_000, 10_000)).unwrap();
        m.transition_to_pre_match().unwrap();
        assert!(m.leave("p1").is_err());
    }
}

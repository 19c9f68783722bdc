use serde::{Deserialize, Serialize};

use crate::model::{Cents, Qty};

/// A player's seat in a match. Starting position is sampled on join and
/// kept hidden from the player until settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub player_id: String,
    pub account_id: String,
    pub starting_cash: Cents,
    pub starting_shares: Qty,
    pub starting_value: Cents,
    pub final_cash: Option<Cents>,
    pub final_shares: Option<Qty>,
    pub final_value: Option<Cents>,
    pub pnl: Option<Cents>,
    pub rank: Option<u32>,
}

impl Participant {
    /// Sample a starting position for `share_fraction` (uniform [0.20, 0.80],
    /// drawn by the caller) against `starting_value` at `target_nav`.
    pub fn new(
        player_id: impl Into<String>,
        account_id: impl Into<String>,
        starting_value: Cents,
        target_nav: Cents,
        share_fraction: f64,
    ) -> Self {
        let starting_shares = ((starting_value as f64 * share_fraction) / target_nav as f64)
            .floor() as Qty;
        let starting_cash = starting_value - starting_shares * target_nav;

        Self {
            player_id: player_id.into(),
            account_id: account_id.into(),
            starting_cash,
            starting_shares,
            starting_value,
            final_cash: None,
            final_shares: None,
            final_value: None,
            pnl: None,
            rank: None,
        }
    }

    pub fn settle(&mut self, final_cash: Cents, final_shares: Qty, current_nav: Cents) {
        let final_value = final_cash + final_shares * current_nav;
        self.final_cash = Some(final_cash);
        self.final_shares = Some(final_shares);
        self.final_value = Some(final_value);
        self.pnl = Some(final_value - self.starting_value);
    }

    pub fn is_settled(&self) -> bool {
        self.pnl.is_some()
    }
}

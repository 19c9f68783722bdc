//! WebSocket broadcast envelope: the
//! tagged JSON frames pushed to connected clients. Transport framing
//! itself (the actual `axum::extract::ws` upgrade/ping-pong loop) is an
//! external collaborator's concern — this module only
//! defines the wire shapes.

use serde::{Deserialize, Serialize};

use crate::model::{BookSnapshot, Cents, Qty, Trade};
use crate::r#match::MatchState;

/// One frame of the broadcast wire protocol, `type`-tagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Book {
        book: BookSnapshot,
    },
    Trade {
        trade: Trade,
    },
    MatchState {
        match_id: String,
        state: MatchState,
        symbol: String,
        duration: u32,
        nav: Cents,
        participants: Vec<ParticipantSummary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bars: Option<Vec<crate::historical::OhlcvBar>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_bar: Option<usize>,
    },
    Countdown {
        match_id: String,
        seconds: u64,
    },
    PriceTick {
        match_id: String,
        nav: Cents,
        market_time: String,
        remaining_sec: u64,
        progress: f64,
    },
    MatchResults {
        match_id: String,
        final_nav: Cents,
        results: Vec<ParticipantResult>,
    },
}

/// A minimal, non-spoiling view of a participant for `match_state` frames
/// — starting position stays hidden until settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub user_id: String,
    pub joined: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub user_id: String,
    pub rank: u32,
    pub pnl: Cents,
    pub final_value: Cents,
    pub start_value: Cents,
    pub start_shares: Qty,
    pub final_shares: Qty,
}

impl From<&crate::r#match::Participant> for ParticipantResult {
    fn from(p: &crate::r#match::Participant) -> Self {
        Self {
            user_id: p.player_id.clone(),
            rank: p.rank.unwrap_or(0),
            pnl: p.pnl.unwrap_or(0),
            final_value: p.final_value.unwrap_or(0),
            start_value: p.starting_value,
            start_shares: p.starting_shares,
            final_shares: p.final_shares.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_frame_round_trips_through_json() {
        let envelope = Envelope::Book {
            book: BookSnapshot {
                symbol: "SIM".into(),
                bids: vec![],
                asks: vec![],
            },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"type\":\"book\""));
        let round_tripped: Envelope = serde_json::from_str(&json).unwrap();
        matches!(round_tripped, Envelope::Book { .. });
    }

    #[test]
    fn countdown_frame_shape() {
        let envelope = Envelope::Countdown {
            match_id: "m1".into(),
            seconds: 15,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["seconds"], 15);
    }
}

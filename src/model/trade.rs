use super::{Cents, Qty};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only trade observation. Trades are never mutated after creation;
/// the book retains a bounded ring of the most recent N (see
/// `config::Config::recent_trades_capacity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    /// Always the resting (maker) order's price — price improvement always
    /// accrues to the aggressor.
    pub price: Cents,
    pub quantity: Qty,
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub timestamp: DateTime<Utc>,
}

use super::{Cents, Qty};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// A single order, resting or fully consumed.
///
/// Invariant: `filled <= quantity`. `is_filled() <=> filled == quantity`.
/// A `Limit` order with `quantity - filled > 0` after matching is resting;
/// a `Market` order never rests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub owner_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Integer cents. Zero for `Market` orders.
    pub limit_price: Cents,
    pub quantity: Qty,
    pub filled: Qty,
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        owner_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        limit_price: Cents,
        quantity: Qty,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            symbol: symbol.into(),
            side,
            order_type,
            limit_price,
            quantity,
            filled: 0,
            submitted_at: Utc::now(),
        }
    }

    #[inline]
    pub fn remaining(&self) -> Qty {
        self.quantity - self.filled
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled == self.quantity
    }

    #[inline]
    pub fn is_resting_eligible(&self) -> bool {
        self.order_type == OrderType::Limit && self.remaining() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_and_filled() {
        let mut o = Order::new("u1", "SIM", Side::Buy, OrderType::Limit, 10_000, 10);
        assert_eq!(o.remaining(), 10);
        assert!(!o.is_filled());
        o.filled = 10;
        assert_eq!(o.remaining(), 0);
        assert!(o.is_filled());
    }

    #[test]
    fn market_orders_never_rest() {
        let o = Order::new("u1", "SIM", Side::Buy, OrderType::Market, 0, 10);
        assert!(!o.is_resting_eligible());
    }
}

//! TradeProfit — a closed round trip derived from a position stream.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ids::TradeArgsId;

/// A round trip bounded by an open and a close transition.
///
/// `amount` is the signed position held (+1 long, -1 short).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeProfit {
    pub trade_args_id: TradeArgsId,
    pub dt_open: NaiveDateTime,
    pub dt_close: NaiveDateTime,
    pub price_open: f64,
    pub price_close: f64,
    pub amount: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub profit_logret: f64,
}

impl TradeProfit {
    pub fn is_long(&self) -> bool {
        self.amount > 0.0
    }

    pub fn is_winner(&self) -> bool {
        self.profit_percent > 0.0
    }
}

//! Profit aggregation — position streams → round-trip trades → summaries.
//!
//! Pure functions: records + prices → trades. A stream that ends with a
//! trade still open is reported as an integrity error rather than paired
//! against whatever event happens to come next.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{PositionRecord, PriceSeries, TradeArgsId, TradeProfit};
use crate::error::CoreError;

/// State for an open trade being tracked during extraction.
struct OpenTrade {
    dt: NaiveDateTime,
    price: f64,
    amount: f64,
}

/// Extract closed trades from one configuration's position stream.
///
/// Every position change closes the running trade (if any) and opens a new
/// one when the new position is nonzero, so a flip yields a close and an
/// open on the same tick. Prices are the latest at or before each tick.
pub fn extract_trades(
    records: &[PositionRecord],
    prices: &PriceSeries,
    fee_rate: f64,
) -> Result<Vec<TradeProfit>, CoreError> {
    let mut trades = Vec::new();
    let mut open: Option<OpenTrade> = None;
    let mut position: i8 = 0;

    for record in records {
        if record.position == position {
            continue;
        }
        let price = price_at(prices, record)?;

        if let Some(running) = open.take() {
            trades.push(close_trade(record.trade_args_id, &running, record.dt, price, fee_rate));
        }
        if record.position != 0 {
            open = Some(OpenTrade {
                dt: record.dt,
                price,
                amount: record.position as f64,
            });
        }
        position = record.position;
    }

    if let (Some(running), Some(last)) = (open, records.last()) {
        let (opens, closes) = count_transitions(records);
        return Err(CoreError::SignalIntegrity {
            trade_args_id: last.trade_args_id,
            date: last.dt.date(),
            detail: format!(
                "position opened at {} never closed ({opens} opens, {closes} closes)",
                running.dt
            ),
        });
    }
    Ok(trades)
}

/// `(opens, closes)` over a stream that starts flat. A flip counts as both.
pub fn count_transitions(records: &[PositionRecord]) -> (usize, usize) {
    let mut opens = 0;
    let mut closes = 0;
    let mut position: i8 = 0;
    for record in records {
        if record.position == position {
            continue;
        }
        if position != 0 {
            closes += 1;
        }
        if record.position != 0 {
            opens += 1;
        }
        position = record.position;
    }
    (opens, closes)
}

fn price_at(prices: &PriceSeries, record: &PositionRecord) -> Result<f64, CoreError> {
    prices
        .value_at_or_before(record.dt)
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| CoreError::no_data(format!("no spot price at or before {}", record.dt)))
}

fn close_trade(
    trade_args_id: TradeArgsId,
    open: &OpenTrade,
    dt_close: NaiveDateTime,
    price_close: f64,
    fee_rate: f64,
) -> TradeProfit {
    let profit = (price_close - open.price) * open.amount;
    let profit_percent = profit / open.price - fee_rate;
    TradeProfit {
        trade_args_id,
        dt_open: open.dt,
        dt_close,
        price_open: open.price,
        price_close,
        amount: open.amount,
        profit,
        profit_percent,
        profit_logret: profit_percent.ln_1p(),
    }
}

// ─── Summaries ───────────────────────────────────────────────────────

/// Aggregates of a set of closed trades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitSummary {
    pub sum_profit: f64,
    pub sum_profit_percent: f64,
    pub sum_logret: f64,
    pub count: usize,
}

impl ProfitSummary {
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a TradeProfit>) -> Self {
        let mut summary = Self::default();
        for trade in trades {
            summary.add(trade);
        }
        summary
    }

    pub fn add(&mut self, trade: &TradeProfit) {
        self.sum_profit += trade.profit;
        self.sum_profit_percent += trade.profit_percent;
        self.sum_logret += trade.profit_logret;
        self.count += 1;
    }

    /// `exp(sum(logret)) - 1`
    pub fn compound_return(&self) -> f64 {
        self.sum_logret.exp_m1()
    }

    /// Mean profit per trade; 0 when there are no trades.
    pub fn mean_profit(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_profit / self.count as f64
        }
    }
}

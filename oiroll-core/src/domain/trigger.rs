//! Resolved per-minute trigger values.
//!
//! A trigger table is what a TradeArgs looks like once its percentile
//! offsets have been pushed through the clip tables for a given week: raw
//! `ratio_diff` levels per time-of-day. The live backtest path and the
//! frozen export path both feed the state machine through this type.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Raw trigger levels for one minute. `None` means the threshold is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerRow {
    pub time: NaiveTime,
    pub long_open: Option<f64>,
    pub long_close: Option<f64>,
    pub short_open: Option<f64>,
    pub short_close: Option<f64>,
}

/// Trigger rows sorted by time-of-day, one per minute at most.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerTable {
    rows: Vec<TriggerRow>,
}

impl TriggerTable {
    pub fn from_rows(mut rows: Vec<TriggerRow>) -> Self {
        rows.sort_by_key(|r| r.time);
        rows.dedup_by_key(|r| r.time);
        Self { rows }
    }

    pub fn rows(&self) -> &[TriggerRow] {
        &self.rows
    }

    pub fn get(&self, time: NaiveTime) -> Option<&TriggerRow> {
        self.rows
            .binary_search_by_key(&time, |r| r.time)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

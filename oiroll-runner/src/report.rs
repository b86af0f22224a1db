//! Batch reports — per-unit outcomes collected instead of aborting a sweep.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use oiroll_core::domain::TradeArgsId;
use oiroll_core::CoreError;

/// A `(TradeArgs, trading day)` unit that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitError {
    pub trade_args_id: TradeArgsId,
    pub date: NaiveDate,
    pub message: String,
    /// True for missing data rather than an integrity violation.
    pub data_absence: bool,
}

impl UnitError {
    pub fn new(trade_args_id: TradeArgsId, date: NaiveDate, err: &CoreError) -> Self {
        Self {
            trade_args_id,
            date,
            message: err.to_string(),
            data_absence: err.is_data_absence(),
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade args {} on {}: {}", self.trade_args_id, self.date, self.message)
    }
}

/// Outcome counts of one batch plus every failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub trades: usize,
    pub failures: Vec<UnitError>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.trades += other.trades;
        self.failures.extend(other.failures);
    }

    /// Sort failures by `(trade_args_id, date)` so reports are stable
    /// regardless of worker scheduling.
    pub fn sort_failures(&mut self) {
        self.failures
            .sort_by(|a, b| (a.trade_args_id, a.date).cmp(&(b.trade_args_id, b.date)));
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} units: {} succeeded, {} skipped, {} failed ({} trades)",
            self.total(),
            self.succeeded,
            self.skipped,
            self.failures.len(),
            self.trades
        )
    }
}

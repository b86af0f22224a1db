//! Error taxonomy shared by every core component.
//!
//! Three classes matter to callers:
//! - data absence (`NoData`, `NotFound`): always raised, never defaulted
//! - integrity violations (`SignalIntegrity`): per-unit, collected by batch drivers
//! - configuration errors (`Config`): rejected before any computation starts

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::TradeArgsId;

/// Errors produced by the core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("no data: {what}")]
    NoData { what: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("signal integrity violation for trade args {trade_args_id} on {date}: {detail}")]
    SignalIntegrity {
        trade_args_id: TradeArgsId,
        date: NaiveDate,
        detail: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn no_data(what: impl Into<String>) -> Self {
        Self::NoData { what: what.into() }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for the data-absence class (`NoData` / `NotFound`).
    pub fn is_data_absence(&self) -> bool {
        matches!(self, Self::NoData { .. } | Self::NotFound { .. })
    }
}

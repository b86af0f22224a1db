//! Roll catalog and outputs: selection methods, their dataset bindings, the
//! per-window selections they produce, and the blended position stream.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::ids::{DatasetId, RollArgsId, RollMethodId, TradeArgsId};
use super::trade_args::{NormFamily, SideMode, TradeArgsParams};
use crate::error::CoreError;
use crate::profit::ProfitSummary;

/// A dataset: one instrument / expiry-priority / strike selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    /// Spot instrument code whose prices value the trades (e.g. "159915").
    pub spotcode: String,
    pub expiry_priority: u8,
    pub strike_selector: String,
}

/// Which aggregate a training slice is ranked by. Ranking is always
/// descending with ties broken by ascending TradeArgs ID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// `sum(profit)`
    #[default]
    SumProfit,
    /// `exp(sum(log-return)) - 1`
    Compound,
    /// Number of closed trades.
    Count,
    /// `sum(profit) / count`
    MeanProfit,
}

impl SortKey {
    pub fn extract(&self, summary: &ProfitSummary) -> f64 {
        match self {
            Self::SumProfit => summary.sum_profit,
            Self::Compound => summary.compound_return(),
            Self::Count => summary.count as f64,
            Self::MeanProfit => summary.mean_profit(),
        }
    }
}

/// How selected candidates' scores become weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// `1 / n` each.
    #[default]
    Equal,
    /// Proportional to positive score; falls back to equal when no score is positive.
    Proportional,
}

/// Static predicates over the TradeArgs universe. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub family: Option<NormFamily>,
    pub side: Option<SideMode>,
    pub noon_close: Option<bool>,
}

impl CandidateFilter {
    pub fn matches(&self, params: &TradeArgsParams) -> bool {
        self.family.map_or(true, |f| params.method.family == f)
            && self.side.map_or(true, |s| params.side_mode() == s)
            && self.noon_close.map_or(true, |n| params.noon_close == n)
    }
}

/// A named selection strategy, independent of any dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollMethodParams {
    pub name: String,
    pub filter: CandidateFilter,
    pub sort_key: SortKey,
    pub pick_count: usize,
    pub weighting: Weighting,
    /// Candidates with fewer closed trades in a slice are not ranked.
    pub min_trades: usize,
    pub validate_days: u32,
    pub train_days_factor: u32,
}

impl RollMethodParams {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pick_count == 0 {
            return Err(CoreError::Config("pick_count must be > 0".into()));
        }
        if self.validate_days == 0 || self.train_days_factor == 0 {
            return Err(CoreError::Config(
                "validate_days and train_days_factor must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn train_days(&self) -> u32 {
        self.validate_days * self.train_days_factor
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollMethod {
    pub id: RollMethodId,
    pub params: RollMethodParams,
}

/// A RollMethod bound to a dataset and a contiguous TradeArgs ID universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollArgsParams {
    pub dataset_id: DatasetId,
    pub roll_method_id: RollMethodId,
    pub trade_args_from_id: TradeArgsId,
    pub trade_args_to_id: TradeArgsId,
}

impl RollArgsParams {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.trade_args_from_id > self.trade_args_to_id {
            return Err(CoreError::Config(format!(
                "trade args universe is empty: {} > {}",
                self.trade_args_from_id, self.trade_args_to_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollArgs {
    pub id: RollArgsId,
    pub params: RollArgsParams,
}

/// One selected candidate for one rolling window.
///
/// `window_from..window_to` is the validation period the prediction applies
/// to. `predict_*` come from the training slice; `real_*` from the validation
/// slice and are `None` for the final window, which has no future data yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollResult {
    pub roll_args_id: RollArgsId,
    pub window_from: NaiveDate,
    pub window_to: NaiveDate,
    pub trade_args_id: TradeArgsId,
    pub predict_rank: u32,
    pub predict_weight: f64,
    pub real_rank: Option<u32>,
    pub real_weight: Option<f64>,
}

/// One change point of a blended position stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollMerged {
    pub roll_args_id: RollArgsId,
    pub top: u32,
    pub dt: NaiveDateTime,
    pub position: f64,
}

//! RollExport — a frozen, self-contained selection snapshot.
//!
//! Everything the signal state machine needs for one ISO week is inlined:
//! selected TradeArgs, their weights and their resolved trigger tables. A
//! process holding only this document and a live ratio feed can replay the
//! production position stream without any normalization data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{DatasetId, ExportId, RollArgsId, TradeArgsId};
use super::trigger::TriggerTable;

/// Current schema version of the export document.
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// Frozen thresholds for one selected TradeArgs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeArgsDetail {
    pub trade_args_id: TradeArgsId,
    pub noon_close: bool,
    pub trigger: TriggerTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollExport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Content hash over every other field.
    pub export_id: ExportId,
    pub roll_args_id: RollArgsId,
    pub roll_top: u32,
    pub spotcode: String,
    pub dataset_id: DatasetId,
    pub input_dt_from: NaiveDate,
    pub input_dt_to: NaiveDate,
    /// Normalized weight per selected TradeArgs.
    pub trade_args: BTreeMap<TradeArgsId, f64>,
    pub trade_args_details: Vec<TradeArgsDetail>,
}

fn default_schema_version() -> u32 {
    EXPORT_SCHEMA_VERSION
}

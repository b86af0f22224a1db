//! Persistence contract.
//!
//! The pipeline only ever talks to a `Store`. Every write is an upsert on the
//! row's natural key; catalogs (datasets, TradeArgs, roll methods, roll args)
//! are append-only and deduplicate by content. All date ranges are half-open
//! `[from, to)` over calendar dates.

pub mod memory;
pub mod snapshot;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Dataset, DatasetId, ExportId, PositionRecord, PriceSeries, PriceTick, RatioSeries, RatioTick,
    RollArgs, RollArgsId, RollArgsParams, RollExport, RollMerged, RollMethod, RollMethodId,
    RollMethodParams, RollResult, TradeArgs, TradeArgsId, TradeArgsParams, TradeProfit,
};
use crate::error::CoreError;
use crate::normalize::{ClipKey, ClipTable};

pub use memory::MemoryStore;
pub use snapshot::{StoreSnapshot, SNAPSHOT_SCHEMA_VERSION};

/// Backtest output for one `(TradeArgs, trading day)` unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOutput {
    pub trade_args_id: TradeArgsId,
    pub date: NaiveDate,
    pub positions: Vec<PositionRecord>,
    pub trades: Vec<TradeProfit>,
}

pub trait Store: Send + Sync {
    // ─── Datasets and market series ──────────────────────────────────

    /// Register a dataset; an identical one already present keeps its ID.
    fn insert_dataset(
        &self,
        spotcode: &str,
        expiry_priority: u8,
        strike_selector: &str,
    ) -> Result<DatasetId, CoreError>;

    fn dataset(&self, id: DatasetId) -> Result<Dataset, CoreError>;

    fn datasets(&self) -> Result<Vec<Dataset>, CoreError>;

    fn upsert_ratio_ticks(&self, dataset_id: DatasetId, ticks: &[RatioTick])
        -> Result<usize, CoreError>;

    fn ratio_series(
        &self,
        dataset_id: DatasetId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RatioSeries, CoreError>;

    fn upsert_prices(&self, spotcode: &str, ticks: &[PriceTick]) -> Result<usize, CoreError>;

    fn price_series(
        &self,
        spotcode: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries, CoreError>;

    // ─── Clip tables ─────────────────────────────────────────────────

    fn upsert_clips(&self, clips: &[(ClipKey, ClipTable)]) -> Result<usize, CoreError>;

    fn clips(&self, dataset_id: DatasetId) -> Result<Vec<(ClipKey, ClipTable)>, CoreError>;

    // ─── TradeArgs catalog ───────────────────────────────────────────

    /// Validate and append; returns the existing ID for a known fingerprint.
    fn insert_trade_args(&self, params: &TradeArgsParams) -> Result<TradeArgsId, CoreError>;

    fn trade_args(&self, id: TradeArgsId) -> Result<TradeArgs, CoreError>;

    /// Catalog entries with `from <= id <= to`.
    fn trade_args_range(
        &self,
        from: TradeArgsId,
        to: TradeArgsId,
    ) -> Result<Vec<TradeArgs>, CoreError>;

    // ─── Backtest outputs ────────────────────────────────────────────

    /// Replace the positions and trades stored for one unit.
    fn upsert_day_output(&self, output: DayOutput) -> Result<(), CoreError>;

    fn has_day_output(&self, trade_args_id: TradeArgsId, date: NaiveDate)
        -> Result<bool, CoreError>;

    fn positions(
        &self,
        trade_args_id: TradeArgsId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PositionRecord>, CoreError>;

    /// Trades opened in `[from, to)` for every listed TradeArgs, ordered by
    /// `(trade_args_id, dt_open)`.
    fn trade_profits(
        &self,
        trade_args_ids: &[TradeArgsId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TradeProfit>, CoreError>;

    // ─── Roll catalog and outputs ────────────────────────────────────

    fn insert_roll_method(&self, params: &RollMethodParams) -> Result<RollMethodId, CoreError>;

    fn roll_method(&self, id: RollMethodId) -> Result<RollMethod, CoreError>;

    fn insert_roll_args(&self, params: &RollArgsParams) -> Result<RollArgsId, CoreError>;

    fn roll_args(&self, id: RollArgsId) -> Result<RollArgs, CoreError>;

    /// Upsert on `(roll_args_id, window_from, trade_args_id)`.
    fn upsert_roll_results(&self, rows: &[RollResult]) -> Result<usize, CoreError>;

    /// Make `rows` the complete selection of one window: rows already stored
    /// under `(roll_args_id, window_from)` are dropped first. Every row must
    /// carry that key.
    fn replace_roll_window(
        &self,
        roll_args_id: RollArgsId,
        window_from: NaiveDate,
        rows: &[RollResult],
    ) -> Result<usize, CoreError>;

    /// Rows whose window overlaps `[from, to)`, ordered by window then rank.
    fn roll_results(
        &self,
        roll_args_id: RollArgsId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RollResult>, CoreError>;

    /// Upsert on `(roll_args_id, top, dt)`, updating only `position`.
    fn upsert_roll_merged(&self, rows: &[RollMerged]) -> Result<usize, CoreError>;

    fn roll_merged(
        &self,
        roll_args_id: RollArgsId,
        top: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RollMerged>, CoreError>;

    fn upsert_roll_export(&self, export: &RollExport) -> Result<(), CoreError>;

    fn roll_export(&self, id: &ExportId) -> Result<RollExport, CoreError>;
}

//! Domain types for the ratio → position → roll pipeline.

pub mod export;
pub mod ids;
pub mod position;
pub mod roll;
pub mod series;
pub mod trade;
pub mod trade_args;
pub mod trigger;

pub use export::{RollExport, TradeArgsDetail, EXPORT_SCHEMA_VERSION};
pub use ids::{fingerprint, DatasetId, ExportId, RollArgsId, RollMethodId, TradeArgsId};
pub use position::{PositionRecord, Zone};
pub use roll::{
    CandidateFilter, Dataset, RollArgs, RollArgsParams, RollMerged, RollMethod, RollMethodParams,
    RollResult, SortKey, Weighting,
};
pub use series::{at_or_before, PriceSeries, PriceTick, RatioSeries, RatioTick};
pub use trade::TradeProfit;
pub use trade_args::{
    is_off, NormFamily, NormMethod, SideMode, TradeArgs, TradeArgsParams, THRESHOLD_OFF,
};
pub use trigger::{TriggerRow, TriggerTable};

//! OIRoll Runner — batch orchestration on top of `oiroll-core`.
//!
//! This crate provides:
//! - TOML run configuration
//! - TradeArgs grid generation
//! - The parallel backtest driver with per-unit error collection
//! - Walk-forward windows, candidate ranking and the roll optimizer
//! - The ensemble merger
//! - Frozen weekly exports and their replay
//! - CSV import/export

pub mod backtest;
pub mod config;
pub mod data_io;
pub mod export;
pub mod grid;
pub mod merge;
pub mod ranking;
pub mod report;
pub mod roll;
pub mod window;

pub use backtest::{day_after, BacktestRequest, Backtester};
pub use config::{ConfigError, RunConfig};
pub use export::{export, replay, ExportError, ReplayOutput};
pub use grid::TradeArgsGrid;
pub use merge::{EnsembleMerger, MergeSummary};
pub use ranking::{rank_candidates, select, Ranked, Selection};
pub use report::{BatchReport, UnitError};
pub use roll::{RollError, RollOptimizer, RollSummary};
pub use window::{create_windows, RollWindow};

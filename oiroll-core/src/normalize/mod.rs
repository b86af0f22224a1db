//! Normalizer — percentile clip tables built from historical windows.

pub mod cache;
pub mod clip;

pub use cache::{ClipCache, ClipKey};
pub use clip::{build_curve, grid, normalize, quantile, ClipColumn, ClipTable, GRID_STEPS};

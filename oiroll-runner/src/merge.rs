//! Ensemble merger — blend the selected configurations into one position
//! stream per `(roll_args, top)`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use oiroll_core::domain::{PositionRecord, RollArgsId, RollMerged, RollResult, TradeArgsId};
use oiroll_core::store::Store;

use crate::backtest::day_after;
use crate::ranking::renormalize;
use crate::roll::RollError;

/// Blended positions are stored at this resolution.
const POSITION_SCALE: f64 = 1e9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub windows: usize,
    pub timestamps: usize,
    /// Timestamps whose contributing weights did not add up to 0 or 1.
    pub dropped: usize,
    /// Windows whose stored top-`top` weights summed to more than 1.
    pub overweight_windows: usize,
    pub rows: usize,
}

/// Weighted position total and contributing weight at one timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Blend {
    pub position: f64,
    pub weight_sum: f64,
}

pub struct EnsembleMerger<'a> {
    store: &'a dyn Store,
    weight_tolerance: f64,
}

impl<'a> EnsembleMerger<'a> {
    pub fn new(store: &'a dyn Store, weight_tolerance: f64) -> Self {
        Self {
            store,
            weight_tolerance,
        }
    }

    /// Merge every window overlapping `from..=to` and upsert the
    /// run-length-compressed stream. Re-running yields identical rows.
    pub fn merge(
        &self,
        roll_args_id: RollArgsId,
        top: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<MergeSummary, RollError> {
        if from > to {
            return Err(RollError::InvalidRange { from, to });
        }
        let core = |source| RollError::Core {
            roll_args_id,
            source,
        };
        self.store.roll_args(roll_args_id).map_err(core)?;
        let end = day_after(to);
        let results = self.store.roll_results(roll_args_id, from, end).map_err(core)?;

        let mut summary = MergeSummary::default();
        let mut stream: Vec<(NaiveDateTime, f64)> = Vec::new();
        for window in group_by_window(&results) {
            let mut weights = top_weights(window, top);
            if weights.is_empty() {
                continue;
            }
            let head = &window[0];
            if let Some(raw) = self.overweight(&weights) {
                warn!(
                    roll_args = %roll_args_id,
                    top,
                    window = %head.window_from,
                    weight_sum = raw,
                    "stored selection weights exceed 1"
                );
                summary.overweight_windows += 1;
            }
            renormalize(&mut weights);
            summary.windows += 1;

            let lo = head.window_from.max(from);
            let hi = head.window_to.min(end);
            debug!(window = %head.window_from, selected = weights.len(), "merging window");
            let mut streams = Vec::with_capacity(weights.len());
            for (id, weight) in &weights {
                let positions = self.store.positions(*id, lo, hi).map_err(core)?;
                streams.push((*weight, positions));
            }

            let blended = weighted_sum_by_timestamp(&streams);
            summary.timestamps += blended.len();
            for (dt, blend) in blended {
                if !self.is_whole(blend.weight_sum) {
                    warn!(
                        roll_args = %roll_args_id,
                        top,
                        %dt,
                        weight_sum = blend.weight_sum,
                        "dropping timestamp with partial weight"
                    );
                    summary.dropped += 1;
                    continue;
                }
                stream.push((dt, quantize(blend.position)));
            }
        }

        let rows: Vec<RollMerged> = run_length_compress(&stream)
            .into_iter()
            .map(|(dt, position)| RollMerged {
                roll_args_id,
                top,
                dt,
                position,
            })
            .collect();
        summary.rows = self.store.upsert_roll_merged(&rows).map_err(core)?;
        info!(
            roll_args = %roll_args_id,
            top,
            windows = summary.windows,
            rows = summary.rows,
            dropped = summary.dropped,
            "merge finished"
        );
        Ok(summary)
    }

    /// Raw weight sum of a top cut, when it is above 1. Cutting below
    /// `pick_count` can only lower the sum.
    fn overweight(&self, weights: &[(TradeArgsId, f64)]) -> Option<f64> {
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        (sum > 1.0 + self.weight_tolerance).then_some(sum)
    }

    fn is_whole(&self, weight_sum: f64) -> bool {
        weight_sum.abs() <= self.weight_tolerance || (weight_sum - 1.0).abs() <= self.weight_tolerance
    }
}

/// Split rows (ordered by window, then rank) into per-window groups.
fn group_by_window(results: &[RollResult]) -> impl Iterator<Item = &[RollResult]> {
    results.chunk_by(|a, b| a.window_from == b.window_from)
}

fn top_weights(window: &[RollResult], top: u32) -> Vec<(TradeArgsId, f64)> {
    window
        .iter()
        .filter(|r| r.predict_rank <= top)
        .map(|r| (r.trade_args_id, r.predict_weight))
        .collect()
}

/// Sum `weight × position` per timestamp across every stream, carrying the
/// total weight that contributed to each timestamp.
pub fn weighted_sum_by_timestamp(
    streams: &[(f64, Vec<PositionRecord>)],
) -> BTreeMap<NaiveDateTime, Blend> {
    let mut out: BTreeMap<NaiveDateTime, Blend> = BTreeMap::new();
    for (weight, records) in streams {
        for record in records {
            let slot = out.entry(record.dt).or_default();
            slot.position += weight * f64::from(record.position);
            slot.weight_sum += weight;
        }
    }
    out
}

/// Keep the first point and every point whose value differs from the one
/// before it.
pub fn run_length_compress(points: &[(NaiveDateTime, f64)]) -> Vec<(NaiveDateTime, f64)> {
    let mut out: Vec<(NaiveDateTime, f64)> = Vec::new();
    for &(dt, value) in points {
        if out.last().map_or(true, |&(_, prev)| prev != value) {
            out.push((dt, value));
        }
    }
    out
}

/// Round to the storage resolution; never yields `-0.0`.
pub(crate) fn quantize(value: f64) -> f64 {
    (value * POSITION_SCALE).round() / POSITION_SCALE + 0.0
}

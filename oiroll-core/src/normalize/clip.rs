//! Clip tables: percentile grid → raw signal value.
//!
//! Building a clip is a three-step inversion:
//! 1. normalize the raw samples into `[0, 1]` with one of the three families
//! 2. sort the `(normalized, raw)` pairs
//! 3. linearly interpolate the raw value at every grid point
//!
//! A running maximum over the grid enforces the non-decreasing invariant.

use serde::{Deserialize, Serialize};

use crate::domain::{NormFamily, NormMethod};
use crate::error::CoreError;

/// Number of grid steps; the grid has `GRID_STEPS + 1` points (0.00..=1.00 by 0.05).
pub const GRID_STEPS: usize = 20;

/// Default sigma clamp for z-score normalization when `variation == 0`.
const DEFAULT_SIGMA: f64 = 3.0;

/// The percentile grid.
pub fn grid() -> [f64; GRID_STEPS + 1] {
    let mut g = [0.0; GRID_STEPS + 1];
    for (i, v) in g.iter_mut().enumerate() {
        *v = i as f64 / GRID_STEPS as f64;
    }
    g
}

/// Which raw column a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipColumn {
    Ratio,
    RatioDiff,
}

/// Percentile lookup table for one `(dataset, method, time-of-day, window)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipTable {
    pub ratio: Vec<f64>,
    pub ratio_diff: Vec<f64>,
}

impl ClipTable {
    /// Build both columns from their samples. Fails with `NoData` when either
    /// column has no finite samples.
    pub fn build(method: NormMethod, ratio: &[f64], ratio_diff: &[f64]) -> Result<Self, CoreError> {
        Ok(Self {
            ratio: build_curve(method, ratio)?,
            ratio_diff: build_curve(method, ratio_diff)?,
        })
    }

    pub fn column(&self, column: ClipColumn) -> &[f64] {
        match column {
            ClipColumn::Ratio => &self.ratio,
            ClipColumn::RatioDiff => &self.ratio_diff,
        }
    }

    /// Raw value at `percentile` (clamped to `[0, 1]`), interpolated on the grid.
    pub fn value_at(&self, column: ClipColumn, percentile: f64) -> f64 {
        let values = self.column(column);
        let last = values.len().saturating_sub(1);
        if values.is_empty() {
            return f64::NAN;
        }
        let pos = percentile.clamp(0.0, 1.0) * last as f64;
        let lo = (pos.floor() as usize).min(last);
        let hi = (lo + 1).min(last);
        let frac = pos - lo as f64;
        values[lo] + (values[hi] - values[lo]) * frac
    }
}

/// Build one grid column from raw samples.
pub fn build_curve(method: NormMethod, samples: &[f64]) -> Result<Vec<f64>, CoreError> {
    let raw: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if raw.is_empty() {
        return Err(CoreError::no_data(format!(
            "no finite samples to build {method} clip"
        )));
    }

    let normalized = normalize(method, &raw);
    let mut pairs: Vec<(f64, f64)> = normalized.into_iter().zip(raw).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    let knots = collapse_ties(&pairs);

    let mut curve: Vec<f64> = grid().iter().map(|&g| interp(g, &knots)).collect();
    for i in 1..curve.len() {
        if curve[i] < curve[i - 1] {
            curve[i] = curve[i - 1];
        }
    }
    Ok(curve)
}

/// Map raw values into `[0, 1]`. Degenerate spread maps everything to 0.5.
pub fn normalize(method: NormMethod, raw: &[f64]) -> Vec<f64> {
    if raw.len() < 2 {
        return vec![0.5; raw.len()];
    }
    match method.family {
        NormFamily::MinMax => {
            let mut sorted = raw.to_vec();
            sorted.sort_by(f64::total_cmp);
            let p = method.variation as f64 / 100.0;
            let lo = quantile(&sorted, p);
            let hi = quantile(&sorted, 1.0 - p);
            let span = hi - lo;
            if span <= 0.0 {
                return vec![0.5; raw.len()];
            }
            raw.iter().map(|x| ((x - lo) / span).clamp(0.0, 1.0)).collect()
        }
        NormFamily::Rank => average_ranks(raw)
            .into_iter()
            .map(|r| r / (raw.len() - 1) as f64)
            .collect(),
        NormFamily::ZScore => {
            let n = raw.len() as f64;
            let mean = raw.iter().sum::<f64>() / n;
            let var = raw.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            if std <= 0.0 {
                return vec![0.5; raw.len()];
            }
            let k = if method.variation == 0 {
                DEFAULT_SIGMA
            } else {
                method.variation as f64
            };
            raw.iter()
                .map(|x| (((x - mean) / std).clamp(-k, k) + k) / (2.0 * k))
                .collect()
        }
    }
}

/// Linear-interpolated quantile of an ascending slice (`q` in `[0, 1]`).
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Zero-based average ranks; ties share the mean of their positions.
fn average_ranks(raw: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| raw[a].total_cmp(&raw[b]));

    let mut ranks = vec![0.0; raw.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && raw[order[j + 1]] == raw[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// One knot per distinct normalized value. Clamped groups keep their
/// innermost raw value: the largest in the lower half, the smallest above.
fn collapse_ties(pairs: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut knots: Vec<(f64, f64)> = Vec::with_capacity(pairs.len());
    for &(x, y) in pairs {
        match knots.last_mut() {
            Some(last) if last.0 == x => {
                if x < 0.5 {
                    last.1 = last.1.max(y);
                }
            }
            _ => knots.push((x, y)),
        }
    }
    knots
}

/// Piecewise-linear interpolation over ascending knots; clamps outside.
fn interp(x: f64, knots: &[(f64, f64)]) -> f64 {
    let (first, last) = match (knots.first(), knots.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return f64::NAN,
    };
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    let j = knots.partition_point(|k| k.0 < x);
    let (x0, y0) = knots[j - 1];
    let (x1, y1) = knots[j];
    if x1 == x0 {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

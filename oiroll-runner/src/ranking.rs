//! Candidate ranking and weight normalization for one slice of trades.
//!
//! Ranking is descending by the method's sort key; ties go to the lower
//! TradeArgs ID so results never depend on input order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use oiroll_core::domain::{SortKey, TradeArgsId, TradeProfit, Weighting};
use oiroll_core::profit::ProfitSummary;

/// One ranked candidate. `rank` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ranked {
    pub trade_args_id: TradeArgsId,
    pub score: f64,
    pub rank: u32,
}

/// A ranked candidate kept by the selection, with its weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub trade_args_id: TradeArgsId,
    pub rank: u32,
    pub weight: f64,
}

/// Per-candidate summaries of the trades in a slice.
pub fn summarize<'a>(
    trades: impl IntoIterator<Item = &'a TradeProfit>,
) -> BTreeMap<TradeArgsId, ProfitSummary> {
    let mut out: BTreeMap<TradeArgsId, ProfitSummary> = BTreeMap::new();
    for trade in trades {
        out.entry(trade.trade_args_id).or_default().add(trade);
    }
    out
}

/// Rank every candidate with at least `min_trades` (and at least one) trade
/// and a finite score.
pub fn rank_candidates(
    summaries: &BTreeMap<TradeArgsId, ProfitSummary>,
    sort_key: SortKey,
    min_trades: usize,
) -> Vec<Ranked> {
    let mut scored: Vec<(TradeArgsId, f64)> = summaries
        .iter()
        .filter(|(_, s)| s.count > 0 && s.count >= min_trades)
        .map(|(id, s)| (*id, sort_key.extract(s)))
        .filter(|(_, score)| score.is_finite())
        .collect();
    scored.sort_by(|a, b| compare_scores(a.1, b.1).then(a.0.cmp(&b.0)));

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (trade_args_id, score))| Ranked {
            trade_args_id,
            score,
            rank: i as u32 + 1,
        })
        .collect()
}

/// Descending by score. Scores are finite here, so `0.0` and `-0.0` tie.
fn compare_scores(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Keep the top `pick_count` and turn their scores into weights summing to 1.
///
/// `Proportional` splits by positive score; candidates at or below zero get
/// no weight, and if nobody is positive every pick is weighted equally.
pub fn select(ranked: &[Ranked], pick_count: usize, weighting: Weighting) -> Vec<Selection> {
    let picked = &ranked[..pick_count.min(ranked.len())];
    if picked.is_empty() {
        return Vec::new();
    }
    let equal = 1.0 / picked.len() as f64;
    let positive_total: f64 = picked.iter().map(|r| r.score.max(0.0)).sum();

    picked
        .iter()
        .map(|r| {
            let weight = match weighting {
                Weighting::Proportional if positive_total > 0.0 => r.score.max(0.0) / positive_total,
                _ => equal,
            };
            Selection {
                trade_args_id: r.trade_args_id,
                rank: r.rank,
                weight,
            }
        })
        .collect()
}

/// Rescale weights so they sum to 1. All-zero input is returned unchanged.
pub fn renormalize(weights: &mut [(TradeArgsId, f64)]) {
    let total: f64 = weights.iter().map(|(_, w)| *w).sum();
    if total > 0.0 {
        for (_, w) in weights.iter_mut() {
            *w /= total;
        }
    }
}

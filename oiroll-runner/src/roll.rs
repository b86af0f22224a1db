//! Roll optimizer — walk-forward selection of the best TradeArgs per window.
//!
//! For each rolling window the training slice ranks every surviving
//! candidate, the top `pick_count` are kept with normalized weights, and the
//! validation slice is ranked the same way for diagnostics. Windows are
//! processed in chronological order; each window's RollResult rows replace
//! whatever an earlier pass stored for it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use oiroll_core::domain::{RollArgsId, RollMethodParams, RollResult, TradeArgsId, TradeProfit};
use oiroll_core::store::Store;
use oiroll_core::CoreError;

use crate::ranking::{rank_candidates, select, summarize};
use crate::window::{create_windows, RollWindow};

/// Tolerance on the sum of a window's predicted weights.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-9;

/// Errors from the roll optimizer and the ensemble merger.
#[derive(Debug, Error)]
pub enum RollError {
    #[error("invalid roll range: {from} > {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("roll args {0} selects no trade args after filtering")]
    EmptyUniverse(RollArgsId),
    #[error("roll args {roll_args_id}: {source}")]
    Core {
        roll_args_id: RollArgsId,
        #[source]
        source: CoreError,
    },
}

impl RollError {
    fn core(roll_args_id: RollArgsId) -> impl Fn(CoreError) -> Self {
        move |source| Self::Core {
            roll_args_id,
            source,
        }
    }

    /// True when the failure is missing data rather than bad input.
    pub fn is_data_absence(&self) -> bool {
        matches!(self, Self::Core { source, .. } if source.is_data_absence())
    }
}

/// What one optimization pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollSummary {
    pub windows: usize,
    pub windows_skipped: usize,
    pub rows: usize,
}

pub struct RollOptimizer<'a> {
    store: &'a dyn Store,
}

impl<'a> RollOptimizer<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Rank, select and upsert every window whose validation period starts
    /// in `dt_from..=dt_to`.
    pub fn optimize(
        &self,
        roll_args_id: RollArgsId,
        dt_from: NaiveDate,
        dt_to: NaiveDate,
    ) -> Result<RollSummary, RollError> {
        if dt_from > dt_to {
            return Err(RollError::InvalidRange {
                from: dt_from,
                to: dt_to,
            });
        }
        let err = RollError::core(roll_args_id);
        let args = self.store.roll_args(roll_args_id).map_err(&err)?;
        let method = self
            .store
            .roll_method(args.params.roll_method_id)
            .map_err(&err)?;
        method.params.validate().map_err(&err)?;
        self.store.dataset(args.params.dataset_id).map_err(&err)?;

        let candidates: Vec<TradeArgsId> = self
            .store
            .trade_args_range(args.params.trade_args_from_id, args.params.trade_args_to_id)
            .map_err(&err)?
            .into_iter()
            .filter(|ta| method.params.filter.matches(&ta.params))
            .map(|ta| ta.id)
            .collect();
        if candidates.is_empty() {
            return Err(RollError::EmptyUniverse(roll_args_id));
        }

        let windows = create_windows(&method.params, dt_from, dt_to);
        let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
            return Ok(RollSummary::default());
        };
        let mut trades = self
            .store
            .trade_profits(&candidates, first.train_from, last.validate_to)
            .map_err(&err)?;
        trades.sort_by_key(|t| (t.dt_open, t.trade_args_id));
        info!(
            roll_args = %roll_args_id,
            method = %method.params.name,
            candidates = candidates.len(),
            windows = windows.len(),
            trades = trades.len(),
            "optimizing"
        );

        let mut summary = RollSummary {
            windows: windows.len(),
            ..RollSummary::default()
        };
        for window in &windows {
            let rows = self.window_rows(roll_args_id, &method.params, window, &trades);
            // The stored window must hold exactly this pass's selection.
            self.store
                .replace_roll_window(roll_args_id, window.validate_from, &rows)
                .map_err(&err)?;
            if rows.is_empty() {
                summary.windows_skipped += 1;
            }
            summary.rows += rows.len();
        }
        info!(roll_args = %roll_args_id, rows = summary.rows, skipped = summary.windows_skipped, "optimization finished");
        Ok(summary)
    }

    fn window_rows(
        &self,
        roll_args_id: RollArgsId,
        method: &RollMethodParams,
        window: &RollWindow,
        trades: &[TradeProfit],
    ) -> Vec<RollResult> {
        let train = summarize(slice(trades, window.train_from, window.train_to));
        if train.is_empty() {
            debug!(window = window.index, from = %window.validate_from, "no training trades");
            return Vec::new();
        }
        let ranked = rank_candidates(&train, method.sort_key, method.min_trades);
        let picks = select(&ranked, method.pick_count, method.weighting);
        if picks.is_empty() {
            debug!(window = window.index, from = %window.validate_from, "no candidate qualified");
            return Vec::new();
        }
        let weight_sum: f64 = picks.iter().map(|p| p.weight).sum();
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            warn!(window = window.index, weight_sum, "predicted weights do not sum to 1");
        }

        let (real_ranked, real_picks) = if window.is_final {
            (Vec::new(), Vec::new())
        } else {
            let validate = summarize(slice(trades, window.validate_from, window.validate_to));
            let ranked = rank_candidates(&validate, method.sort_key, method.min_trades);
            let picks = select(&ranked, method.pick_count, method.weighting);
            (ranked, picks)
        };

        picks
            .iter()
            .map(|pick| {
                let (real_rank, real_weight) = if window.is_final {
                    (None, None)
                } else {
                    let rank = real_ranked
                        .iter()
                        .find(|r| r.trade_args_id == pick.trade_args_id)
                        .map(|r| r.rank);
                    let weight = real_picks
                        .iter()
                        .find(|p| p.trade_args_id == pick.trade_args_id)
                        .map_or(0.0, |p| p.weight);
                    (rank, Some(weight))
                };
                RollResult {
                    roll_args_id,
                    window_from: window.validate_from,
                    window_to: window.validate_to,
                    trade_args_id: pick.trade_args_id,
                    predict_rank: pick.rank,
                    predict_weight: pick.weight,
                    real_rank,
                    real_weight,
                }
            })
            .collect()
    }
}

/// Trades opened in `[from, to)`. `trades` must be sorted by `dt_open`.
fn slice(trades: &[TradeProfit], from: NaiveDate, to: NaiveDate) -> &[TradeProfit] {
    let lo = trades.partition_point(|t| t.dt_open.date() < from);
    let hi = trades.partition_point(|t| t.dt_open.date() < to);
    &trades[lo..hi.max(lo)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use oiroll_core::domain::{
        CandidateFilter, NormMethod, RollArgsParams, RollMethodParams, SortKey, TradeArgsParams,
        Weighting, THRESHOLD_OFF,
    };
    use oiroll_core::store::{DayOutput, MemoryStore};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn at(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(10, 0, 0).unwrap()
    }

    fn params(long_open: f64) -> TradeArgsParams {
        TradeArgsParams {
            method: NormMethod::rank(),
            train_days: 14,
            zero_threshold: 0.5,
            long_open,
            long_close: -0.1,
            short_open: THRESHOLD_OFF,
            short_close: THRESHOLD_OFF,
            noon_close: false,
        }
    }

    fn trade(id: TradeArgsId, date: NaiveDate, profit: f64) -> TradeProfit {
        TradeProfit {
            trade_args_id: id,
            dt_open: at(date),
            dt_close: at(date) + chrono::Duration::minutes(30),
            price_open: 100.0,
            price_close: 100.0 + profit,
            amount: 1.0,
            profit,
            profit_percent: profit / 100.0,
            profit_logret: (profit / 100.0).ln_1p(),
        }
    }

    fn put(store: &MemoryStore, id: TradeArgsId, date: NaiveDate, profit: f64) {
        store
            .upsert_day_output(DayOutput {
                trade_args_id: id,
                date,
                positions: Vec::new(),
                trades: vec![trade(id, date, profit)],
            })
            .unwrap();
    }

    fn setup(pick_count: usize) -> (MemoryStore, RollArgsId, Vec<TradeArgsId>) {
        let store = MemoryStore::new();
        let ds = store.insert_dataset("159915", 1, "atm").unwrap();
        let ids: Vec<TradeArgsId> = [-0.45, -0.35, -0.25]
            .iter()
            .map(|lo| store.insert_trade_args(&params(*lo)).unwrap())
            .collect();
        let method = store
            .insert_roll_method(&RollMethodParams {
                name: "weekly".into(),
                filter: CandidateFilter::default(),
                sort_key: SortKey::SumProfit,
                pick_count,
                weighting: Weighting::Equal,
                min_trades: 0,
                validate_days: 7,
                train_days_factor: 1,
            })
            .unwrap();
        let roll_args = store
            .insert_roll_args(&RollArgsParams {
                dataset_id: ds,
                roll_method_id: method,
                trade_args_from_id: ids[0],
                trade_args_to_id: ids[2],
            })
            .unwrap();
        (store, roll_args, ids)
    }

    #[test]
    fn selects_top_candidates_per_window() {
        let (store, roll_args, ids) = setup(2);
        // Training week of 2024-01-15 is 2024-01-08..15.
        put(&store, ids[0], d(1, 9), 1.0);
        put(&store, ids[1], d(1, 9), 3.0);
        put(&store, ids[2], d(1, 10), 2.0);
        // Validation week flips the order.
        put(&store, ids[0], d(1, 16), 5.0);
        put(&store, ids[1], d(1, 16), -1.0);

        let summary = RollOptimizer::new(&store)
            .optimize(roll_args, d(1, 15), d(1, 21))
            .unwrap();
        assert_eq!(summary.windows, 1);
        assert_eq!(summary.rows, 2);

        let rows = store.roll_results(roll_args, d(1, 15), d(1, 22)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trade_args_id, ids[1]);
        assert_eq!(rows[0].predict_rank, 1);
        assert_eq!(rows[1].trade_args_id, ids[2]);
        assert!((rows.iter().map(|r| r.predict_weight).sum::<f64>() - 1.0).abs() < 1e-9);
        // ids[1] ranks second in validation; ids[2] never traded there.
        assert_eq!(rows[0].real_rank, Some(2));
        assert_eq!(rows[1].real_rank, None);
        assert_eq!(rows[1].real_weight, Some(0.0));
    }

    #[test]
    fn final_window_has_no_real_scores() {
        let (store, roll_args, ids) = setup(1);
        put(&store, ids[0], d(1, 9), 1.0);
        RollOptimizer::new(&store)
            .optimize(roll_args, d(1, 15), d(1, 17))
            .unwrap();
        let rows = store.roll_results(roll_args, d(1, 15), d(1, 22)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].real_rank, None);
        assert_eq!(rows[0].real_weight, None);
    }

    #[test]
    fn reoptimizing_replaces_the_previous_selection() {
        let (store, roll_args, ids) = setup(1);
        put(&store, ids[1], d(1, 9), 3.0);
        let optimizer = RollOptimizer::new(&store);
        optimizer.optimize(roll_args, d(1, 15), d(1, 17)).unwrap();
        let rows = store.roll_results(roll_args, d(1, 15), d(1, 22)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trade_args_id, ids[1]);

        // New training data moves ids[0] to the top.
        put(&store, ids[0], d(1, 10), 5.0);
        let summary = optimizer.optimize(roll_args, d(1, 15), d(1, 17)).unwrap();
        assert_eq!(summary.rows, 1);
        let rows = store.roll_results(roll_args, d(1, 15), d(1, 22)).unwrap();
        assert_eq!(rows.len(), 1, "stale pick left behind: {rows:?}");
        assert_eq!(rows[0].trade_args_id, ids[0]);
        let weight_sum: f64 = rows.iter().map(|r| r.predict_weight).sum();
        assert!((weight_sum - 1.0).abs() < WEIGHT_SUM_EPSILON);
    }

    #[test]
    fn windows_without_training_rows_are_skipped() {
        let (store, roll_args, _) = setup(1);
        let summary = RollOptimizer::new(&store)
            .optimize(roll_args, d(1, 15), d(1, 28))
            .unwrap();
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.windows_skipped, 2);
        assert_eq!(summary.rows, 0);
    }

    #[test]
    fn unknown_roll_args_is_data_absence() {
        let store = MemoryStore::new();
        let err = RollOptimizer::new(&store)
            .optimize(RollArgsId(7), d(1, 1), d(1, 31))
            .unwrap_err();
        assert!(err.is_data_absence());
    }

    #[test]
    fn inverted_range_rejected_up_front() {
        let store = MemoryStore::new();
        assert!(matches!(
            RollOptimizer::new(&store).optimize(RollArgsId(1), d(2, 1), d(1, 1)),
            Err(RollError::InvalidRange { .. })
        ));
    }
}

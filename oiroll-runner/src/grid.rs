//! TradeArgs grid — cartesian product of threshold parameters.

use serde::{Deserialize, Serialize};
use tracing::debug;

use oiroll_core::domain::{NormMethod, TradeArgsId, TradeArgsParams, THRESHOLD_OFF};
use oiroll_core::store::Store;
use oiroll_core::CoreError;

/// Parameter grid specification. Every combination that passes
/// `TradeArgsParams::validate` becomes one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeArgsGrid {
    pub methods: Vec<NormMethod>,
    pub train_days: Vec<u32>,
    pub zero_thresholds: Vec<f64>,
    pub long_open: Vec<f64>,
    pub long_close: Vec<f64>,
    pub short_open: Vec<f64>,
    pub short_close: Vec<f64>,
    pub noon_close: Vec<bool>,
}

impl Default for TradeArgsGrid {
    /// A small grid covering every family, both sides and both noon modes.
    fn default() -> Self {
        Self {
            methods: vec![
                NormMethod::min_max(0),
                NormMethod::min_max(5),
                NormMethod::rank(),
                NormMethod::z_score(3),
            ],
            train_days: vec![14, 28],
            zero_thresholds: vec![0.5],
            long_open: vec![-0.45, -0.35, THRESHOLD_OFF],
            long_close: vec![-0.2],
            short_open: vec![0.35, 0.45, THRESHOLD_OFF],
            short_close: vec![0.2],
            noon_close: vec![false, true],
        }
    }
}

impl TradeArgsGrid {
    /// Upper bound on the number of configurations (before validation).
    pub fn size(&self) -> usize {
        self.methods.len()
            * self.train_days.len()
            * self.zero_thresholds.len()
            * self.long_open.len()
            * self.long_close.len()
            * self.short_open.len()
            * self.short_close.len()
            * self.noon_close.len()
    }

    /// All valid combinations, in a fixed nesting order.
    pub fn generate(&self) -> Vec<TradeArgsParams> {
        let mut out = Vec::with_capacity(self.size());
        for &method in &self.methods {
            for &train_days in &self.train_days {
                for &zero_threshold in &self.zero_thresholds {
                    for &long_open in &self.long_open {
                        for &long_close in &self.long_close {
                            for &short_open in &self.short_open {
                                for &short_close in &self.short_close {
                                    for &noon_close in &self.noon_close {
                                        let params = TradeArgsParams {
                                            method,
                                            train_days,
                                            zero_threshold,
                                            long_open,
                                            long_close,
                                            short_open,
                                            short_close,
                                            noon_close,
                                        };
                                        if params.validate().is_ok() {
                                            out.push(params);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Insert every combination and return the covered ID range.
    ///
    /// Entries already in the catalog keep their IDs, so the range is only
    /// contiguous for a grid whose entries are all new.
    pub fn insert_into(&self, store: &dyn Store) -> Result<(TradeArgsId, TradeArgsId), CoreError> {
        let params = self.generate();
        if params.is_empty() {
            return Err(CoreError::Config("trade args grid has no valid combination".into()));
        }
        let mut lo = TradeArgsId(u64::MAX);
        let mut hi = TradeArgsId(0);
        for p in &params {
            let id = store.insert_trade_args(p)?;
            lo = lo.min(id);
            hi = hi.max(id);
        }
        debug!(count = params.len(), from = %lo, to = %hi, "inserted trade args grid");
        Ok((lo, hi))
    }
}

//! Live threshold resolution: TradeArgs offsets → raw per-minute triggers.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;

use crate::calendar::{week_monday, SessionCalendar};
use crate::domain::{DatasetId, NormMethod, RatioSeries, TradeArgsParams, TriggerRow, TriggerTable};
use crate::error::CoreError;
use crate::normalize::{ClipCache, ClipColumn, ClipKey, ClipTable};

/// Resolves trigger tables from a ratio history through a shared clip cache.
///
/// The series must reach back far enough to cover the longest training
/// window in use; minutes with no history are left out of the table.
pub struct ClipResolver<'a> {
    dataset_id: DatasetId,
    series: &'a RatioSeries,
    cache: &'a ClipCache,
    calendar: &'a SessionCalendar,
}

impl<'a> ClipResolver<'a> {
    pub fn new(
        dataset_id: DatasetId,
        series: &'a RatioSeries,
        cache: &'a ClipCache,
        calendar: &'a SessionCalendar,
    ) -> Self {
        Self {
            dataset_id,
            series,
            cache,
            calendar,
        }
    }

    pub fn series(&self) -> &'a RatioSeries {
        self.series
    }

    /// Training window `[from, to)` used for trading day `date`.
    ///
    /// Anchored on the Monday of `date`'s ISO week, so every day of a week
    /// resolves identical thresholds.
    pub fn clip_window(date: NaiveDate, train_days: u32) -> (NaiveDate, NaiveDate) {
        let to = week_monday(date);
        (to - Duration::days(train_days as i64), to)
    }

    /// Cached clip for one key, built from the series on a miss.
    pub fn clip(
        &self,
        method: NormMethod,
        time: NaiveTime,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Arc<ClipTable>, CoreError> {
        let key = ClipKey {
            dataset_id: self.dataset_id,
            method,
            time,
            from,
            to,
        };
        self.cache.get_or_build(key, || {
            let (ratio, ratio_diff) = self.series.samples_at(time, from, to);
            ClipTable::build(method, &ratio, &ratio_diff).map_err(|_| {
                CoreError::no_data(format!(
                    "dataset {} has no {time} samples in [{from}, {to})",
                    self.dataset_id
                ))
            })
        })
    }

    /// Per-minute trigger table for `params` on `date`.
    pub fn trigger_table(
        &self,
        params: &TradeArgsParams,
        date: NaiveDate,
    ) -> Result<TriggerTable, CoreError> {
        let (from, to) = Self::clip_window(date, params.train_days);
        let mut rows = Vec::new();
        for time in self.calendar.session_minutes() {
            let clip = match self.clip(params.method, time, from, to) {
                Ok(clip) => clip,
                Err(e) if e.is_data_absence() => continue,
                Err(e) => return Err(e),
            };
            rows.push(resolve_row(params, &clip, time));
        }
        if rows.is_empty() {
            return Err(CoreError::no_data(format!(
                "no clip history for dataset {} in [{from}, {to})",
                self.dataset_id
            )));
        }
        Ok(TriggerTable::from_rows(rows))
    }
}

/// Resolve all four thresholds of `params` against one clip.
pub fn resolve_row(params: &TradeArgsParams, clip: &ClipTable, time: NaiveTime) -> TriggerRow {
    let raw = |offset: f64| {
        params
            .percentile_for(offset)
            .map(|p| clip.value_at(ClipColumn::RatioDiff, p))
    };
    TriggerRow {
        time,
        long_open: raw(params.long_open),
        long_close: raw(params.long_close),
        short_open: raw(params.short_open),
        short_close: raw(params.short_close),
    }
}

//! Intraday input series: open-interest ratio ticks and spot prices.
//!
//! Both series are kept sorted by timestamp with at most one tick per
//! timestamp, so day slices and "value at or before" lookups are binary
//! searches rather than scans.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// One ratio observation. `ratio_diff` is the deviation from the session's
/// opening ratio and is the value the state machine trades on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioTick {
    pub dt: NaiveDateTime,
    pub ratio: f64,
    pub ratio_diff: f64,
}

/// Time-ordered ratio ticks for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioSeries {
    ticks: Vec<RatioTick>,
}

impl RatioSeries {
    /// Build from ticks in any order. Later duplicates of a timestamp win.
    pub fn new(mut ticks: Vec<RatioTick>) -> Self {
        ticks.sort_by_key(|t| t.dt);
        dedup_keep_last(&mut ticks, |t| t.dt);
        Self { ticks }
    }

    /// Build from raw `(timestamp, ratio)` points, deriving `ratio_diff` as the
    /// deviation from each day's first ratio.
    pub fn from_ratios(points: impl IntoIterator<Item = (NaiveDateTime, f64)>) -> Self {
        let mut raw: Vec<(NaiveDateTime, f64)> = points.into_iter().collect();
        raw.sort_by_key(|p| p.0);

        let mut ticks = Vec::with_capacity(raw.len());
        let mut session: Option<(NaiveDate, f64)> = None;
        for (dt, ratio) in raw {
            let open = match session {
                Some((date, open)) if date == dt.date() => open,
                _ => {
                    session = Some((dt.date(), ratio));
                    ratio
                }
            };
            ticks.push(RatioTick {
                dt,
                ratio,
                ratio_diff: ratio - open,
            });
        }
        Self::new(ticks)
    }

    pub fn ticks(&self) -> &[RatioTick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Ticks with `from <= date < to`.
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> &[RatioTick] {
        let start = self.ticks.partition_point(|t| t.dt.date() < from);
        let end = self.ticks.partition_point(|t| t.dt.date() < to);
        &self.ticks[start..end.max(start)]
    }

    /// Ticks of a single trading day.
    pub fn day(&self, date: NaiveDate) -> &[RatioTick] {
        match date.succ_opt() {
            Some(next) => self.range(date, next),
            None => &[],
        }
    }

    /// Distinct trading dates present in the series, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.ticks.iter().map(|t| t.dt.date()).collect();
        dates.dedup();
        dates
    }

    /// `(ratio, ratio_diff)` samples observed at `time` on days in `[from, to)`.
    pub fn samples_at(&self, time: NaiveTime, from: NaiveDate, to: NaiveDate) -> (Vec<f64>, Vec<f64>) {
        let mut ratios = Vec::new();
        let mut diffs = Vec::new();
        for tick in self.range(from, to).iter().filter(|t| t.dt.time() == time) {
            ratios.push(tick.ratio);
            diffs.push(tick.ratio_diff);
        }
        (ratios, diffs)
    }

    /// Owned copy of the ticks in `[from, to)`.
    pub fn slice(&self, from: NaiveDate, to: NaiveDate) -> RatioSeries {
        RatioSeries {
            ticks: self.range(from, to).to_vec(),
        }
    }
}

/// One spot price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub dt: NaiveDateTime,
    pub price: f64,
}

/// Time-ordered spot prices used to value trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    ticks: Vec<PriceTick>,
}

impl PriceSeries {
    pub fn new(mut ticks: Vec<PriceTick>) -> Self {
        ticks.sort_by_key(|t| t.dt);
        dedup_keep_last(&mut ticks, |t| t.dt);
        Self { ticks }
    }

    pub fn ticks(&self) -> &[PriceTick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Price of the latest tick at or before `dt`.
    pub fn value_at_or_before(&self, dt: NaiveDateTime) -> Option<f64> {
        at_or_before(&self.ticks, dt, |t| t.dt).map(|t| t.price)
    }
}

/// Binary search for the last item whose key is `<= at`.
///
/// `items` must be sorted ascending by `key`.
pub fn at_or_before<T, K: Ord>(items: &[T], at: K, key: impl Fn(&T) -> K) -> Option<&T> {
    let idx = items.partition_point(|item| key(item) <= at);
    idx.checked_sub(1).map(|i| &items[i])
}

fn dedup_keep_last<T, K: PartialEq>(items: &mut Vec<T>, key: impl Fn(&T) -> K) {
    // Stable sort keeps insertion order among equal keys; keep the last one.
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if let Some(prev) = out.last_mut() {
            if key(prev) == key(&item) {
                *prev = item;
                continue;
            }
        }
        out.push(item);
    }
    *items = out;
}

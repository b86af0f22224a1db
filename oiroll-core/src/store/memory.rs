//! In-memory `Store` backed by ordered maps keyed on each row's natural key.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{DayOutput, Store, StoreSnapshot, SNAPSHOT_SCHEMA_VERSION};
use crate::domain::{
    fingerprint, Dataset, DatasetId, ExportId, PositionRecord, PriceSeries, PriceTick,
    RatioSeries, RatioTick, RollArgs, RollArgsId, RollArgsParams, RollExport, RollMerged,
    RollMethod, RollMethodId, RollMethodParams, RollResult, TradeArgs, TradeArgsId,
    TradeArgsParams, TradeProfit,
};
use crate::error::CoreError;
use crate::normalize::{ClipKey, ClipTable};

#[derive(Debug, Default)]
struct Tables {
    datasets: BTreeMap<DatasetId, Dataset>,
    ratio: BTreeMap<(DatasetId, NaiveDateTime), RatioTick>,
    prices: BTreeMap<(String, NaiveDateTime), PriceTick>,
    clips: BTreeMap<ClipKey, ClipTable>,
    trade_args: BTreeMap<TradeArgsId, TradeArgs>,
    trade_args_index: HashMap<String, TradeArgsId>,
    day_outputs: BTreeMap<(TradeArgsId, NaiveDate), DayOutput>,
    roll_methods: BTreeMap<RollMethodId, RollMethod>,
    roll_method_index: HashMap<String, RollMethodId>,
    roll_args: BTreeMap<RollArgsId, RollArgs>,
    roll_args_index: HashMap<String, RollArgsId>,
    roll_results: BTreeMap<(RollArgsId, NaiveDate, TradeArgsId), RollResult>,
    roll_merged: BTreeMap<(RollArgsId, u32, NaiveDateTime), RollMerged>,
    roll_exports: BTreeMap<ExportId, RollExport>,
}

/// Thread-safe in-memory store. Cheap to share by reference across a
/// rayon sweep; writers take a short exclusive lock per call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy every table into a serializable snapshot.
    pub fn to_snapshot(&self) -> StoreSnapshot {
        let t = self.read();
        StoreSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            datasets: t.datasets.values().cloned().collect(),
            ratio_ticks: t.ratio.iter().map(|((id, _), tick)| (*id, *tick)).collect(),
            prices: t
                .prices
                .iter()
                .map(|((code, _), tick)| (code.clone(), *tick))
                .collect(),
            clips: t.clips.iter().map(|(k, v)| (*k, v.clone())).collect(),
            trade_args: t.trade_args.values().copied().collect(),
            day_outputs: t.day_outputs.values().cloned().collect(),
            roll_methods: t.roll_methods.values().cloned().collect(),
            roll_args: t.roll_args.values().copied().collect(),
            roll_results: t.roll_results.values().copied().collect(),
            roll_merged: t.roll_merged.values().copied().collect(),
            roll_exports: t.roll_exports.values().cloned().collect(),
        }
    }

    /// Rebuild a store (and its fingerprint indices) from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, CoreError> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(CoreError::Storage(format!(
                "unsupported snapshot schema version {} (expected {SNAPSHOT_SCHEMA_VERSION})",
                snapshot.schema_version
            )));
        }

        let mut t = Tables::default();
        for d in snapshot.datasets {
            t.datasets.insert(d.id, d);
        }
        for (id, tick) in snapshot.ratio_ticks {
            t.ratio.insert((id, tick.dt), tick);
        }
        for (code, tick) in snapshot.prices {
            t.prices.insert((code, tick.dt), tick);
        }
        t.clips.extend(snapshot.clips);
        for ta in snapshot.trade_args {
            t.trade_args_index.insert(fingerprint_of(&ta.params)?, ta.id);
            t.trade_args.insert(ta.id, ta);
        }
        for out in snapshot.day_outputs {
            t.day_outputs.insert((out.trade_args_id, out.date), out);
        }
        for m in snapshot.roll_methods {
            t.roll_method_index.insert(fingerprint_of(&m.params)?, m.id);
            t.roll_methods.insert(m.id, m);
        }
        for a in snapshot.roll_args {
            t.roll_args_index.insert(fingerprint_of(&a.params)?, a.id);
            t.roll_args.insert(a.id, a);
        }
        for r in snapshot.roll_results {
            t.roll_results
                .insert((r.roll_args_id, r.window_from, r.trade_args_id), r);
        }
        for m in snapshot.roll_merged {
            t.roll_merged.insert((m.roll_args_id, m.top, m.dt), m);
        }
        for e in snapshot.roll_exports {
            t.roll_exports.insert(e.export_id.clone(), e);
        }
        Ok(Self {
            tables: RwLock::new(t),
        })
    }
}

fn fingerprint_of<T: serde::Serialize>(value: &T) -> Result<String, CoreError> {
    fingerprint(value).map_err(|e| CoreError::Storage(format!("fingerprint: {e}")))
}

fn next_id<K: Copy, V>(map: &BTreeMap<K, V>, raw: impl Fn(K) -> u64) -> u64 {
    map.keys().next_back().map_or(1, |k| raw(*k) + 1)
}

fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

impl Store for MemoryStore {
    fn insert_dataset(
        &self,
        spotcode: &str,
        expiry_priority: u8,
        strike_selector: &str,
    ) -> Result<DatasetId, CoreError> {
        let mut t = self.write();
        let existing = t.datasets.values().find(|d| {
            d.spotcode == spotcode
                && d.expiry_priority == expiry_priority
                && d.strike_selector == strike_selector
        });
        if let Some(d) = existing {
            return Ok(d.id);
        }
        let id = DatasetId(next_id(&t.datasets, |k| k.0));
        t.datasets.insert(
            id,
            Dataset {
                id,
                spotcode: spotcode.to_string(),
                expiry_priority,
                strike_selector: strike_selector.to_string(),
            },
        );
        Ok(id)
    }

    fn dataset(&self, id: DatasetId) -> Result<Dataset, CoreError> {
        self.read()
            .datasets
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("dataset", id))
    }

    fn datasets(&self) -> Result<Vec<Dataset>, CoreError> {
        Ok(self.read().datasets.values().cloned().collect())
    }

    fn upsert_ratio_ticks(
        &self,
        dataset_id: DatasetId,
        ticks: &[RatioTick],
    ) -> Result<usize, CoreError> {
        let mut t = self.write();
        if !t.datasets.contains_key(&dataset_id) {
            return Err(CoreError::not_found("dataset", dataset_id));
        }
        for tick in ticks {
            t.ratio.insert((dataset_id, tick.dt), *tick);
        }
        Ok(ticks.len())
    }

    fn ratio_series(
        &self,
        dataset_id: DatasetId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RatioSeries, CoreError> {
        if from >= to {
            return Ok(RatioSeries::default());
        }
        let t = self.read();
        let ticks = t
            .ratio
            .range((dataset_id, day_start(from))..(dataset_id, day_start(to)))
            .map(|(_, tick)| *tick)
            .collect();
        Ok(RatioSeries::new(ticks))
    }

    fn upsert_prices(&self, spotcode: &str, ticks: &[PriceTick]) -> Result<usize, CoreError> {
        let mut t = self.write();
        for tick in ticks {
            t.prices.insert((spotcode.to_string(), tick.dt), *tick);
        }
        Ok(ticks.len())
    }

    fn price_series(
        &self,
        spotcode: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries, CoreError> {
        if from >= to {
            return Ok(PriceSeries::default());
        }
        let t = self.read();
        let lo = (spotcode.to_string(), day_start(from));
        let hi = (spotcode.to_string(), day_start(to));
        let ticks = t.prices.range(lo..hi).map(|(_, tick)| *tick).collect();
        Ok(PriceSeries::new(ticks))
    }

    fn upsert_clips(&self, clips: &[(ClipKey, ClipTable)]) -> Result<usize, CoreError> {
        let mut t = self.write();
        for (key, table) in clips {
            t.clips.insert(*key, table.clone());
        }
        Ok(clips.len())
    }

    fn clips(&self, dataset_id: DatasetId) -> Result<Vec<(ClipKey, ClipTable)>, CoreError> {
        Ok(self
            .read()
            .clips
            .iter()
            .filter(|(k, _)| k.dataset_id == dataset_id)
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn insert_trade_args(&self, params: &TradeArgsParams) -> Result<TradeArgsId, CoreError> {
        params.validate()?;
        let fp = fingerprint_of(params)?;
        let mut t = self.write();
        if let Some(id) = t.trade_args_index.get(&fp) {
            return Ok(*id);
        }
        let id = TradeArgsId(next_id(&t.trade_args, |k| k.0));
        t.trade_args.insert(id, TradeArgs { id, params: *params });
        t.trade_args_index.insert(fp, id);
        Ok(id)
    }

    fn trade_args(&self, id: TradeArgsId) -> Result<TradeArgs, CoreError> {
        self.read()
            .trade_args
            .get(&id)
            .copied()
            .ok_or_else(|| CoreError::not_found("trade args", id))
    }

    fn trade_args_range(
        &self,
        from: TradeArgsId,
        to: TradeArgsId,
    ) -> Result<Vec<TradeArgs>, CoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .read()
            .trade_args
            .range(from..=to)
            .map(|(_, ta)| *ta)
            .collect())
    }

    fn upsert_day_output(&self, output: DayOutput) -> Result<(), CoreError> {
        self.write()
            .day_outputs
            .insert((output.trade_args_id, output.date), output);
        Ok(())
    }

    fn has_day_output(
        &self,
        trade_args_id: TradeArgsId,
        date: NaiveDate,
    ) -> Result<bool, CoreError> {
        Ok(self.read().day_outputs.contains_key(&(trade_args_id, date)))
    }

    fn positions(
        &self,
        trade_args_id: TradeArgsId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PositionRecord>, CoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(self
            .read()
            .day_outputs
            .range((trade_args_id, from)..(trade_args_id, to))
            .flat_map(|(_, out)| out.positions.iter().copied())
            .collect())
    }

    fn trade_profits(
        &self,
        trade_args_ids: &[TradeArgsId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TradeProfit>, CoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let mut ids = trade_args_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let t = self.read();
        let mut out = Vec::new();
        for id in ids {
            for (_, day) in t.day_outputs.range((id, from)..(id, to)) {
                out.extend(
                    day.trades
                        .iter()
                        .filter(|tp| tp.dt_open.date() >= from && tp.dt_open.date() < to),
                );
            }
        }
        Ok(out)
    }

    fn insert_roll_method(&self, params: &RollMethodParams) -> Result<RollMethodId, CoreError> {
        params.validate()?;
        let fp = fingerprint_of(params)?;
        let mut t = self.write();
        if let Some(id) = t.roll_method_index.get(&fp) {
            return Ok(*id);
        }
        let id = RollMethodId(next_id(&t.roll_methods, |k| k.0));
        t.roll_methods.insert(
            id,
            RollMethod {
                id,
                params: params.clone(),
            },
        );
        t.roll_method_index.insert(fp, id);
        Ok(id)
    }

    fn roll_method(&self, id: RollMethodId) -> Result<RollMethod, CoreError> {
        self.read()
            .roll_methods
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("roll method", id))
    }

    fn insert_roll_args(&self, params: &RollArgsParams) -> Result<RollArgsId, CoreError> {
        params.validate()?;
        let fp = fingerprint_of(params)?;
        let mut t = self.write();
        if !t.datasets.contains_key(&params.dataset_id) {
            return Err(CoreError::not_found("dataset", params.dataset_id));
        }
        if !t.roll_methods.contains_key(&params.roll_method_id) {
            return Err(CoreError::not_found("roll method", params.roll_method_id));
        }
        if let Some(id) = t.roll_args_index.get(&fp) {
            return Ok(*id);
        }
        let id = RollArgsId(next_id(&t.roll_args, |k| k.0));
        t.roll_args.insert(id, RollArgs { id, params: *params });
        t.roll_args_index.insert(fp, id);
        Ok(id)
    }

    fn roll_args(&self, id: RollArgsId) -> Result<RollArgs, CoreError> {
        self.read()
            .roll_args
            .get(&id)
            .copied()
            .ok_or_else(|| CoreError::not_found("roll args", id))
    }

    fn upsert_roll_results(&self, rows: &[RollResult]) -> Result<usize, CoreError> {
        let mut t = self.write();
        for row in rows {
            let key = (row.roll_args_id, row.window_from, row.trade_args_id);
            match t.roll_results.get_mut(&key) {
                Some(existing) => {
                    existing.window_to = row.window_to;
                    existing.predict_rank = row.predict_rank;
                    existing.predict_weight = row.predict_weight;
                    existing.real_rank = row.real_rank;
                    existing.real_weight = row.real_weight;
                }
                None => {
                    t.roll_results.insert(key, *row);
                }
            }
        }
        Ok(rows.len())
    }

    fn replace_roll_window(
        &self,
        roll_args_id: RollArgsId,
        window_from: NaiveDate,
        rows: &[RollResult],
    ) -> Result<usize, CoreError> {
        if let Some(stray) = rows
            .iter()
            .find(|r| r.roll_args_id != roll_args_id || r.window_from != window_from)
        {
            return Err(CoreError::Config(format!(
                "row for roll args {} window {} does not belong to window {window_from} of roll args {roll_args_id}",
                stray.roll_args_id, stray.window_from
            )));
        }
        let mut t = self.write();
        t.roll_results
            .retain(|(args, from, _), _| !(*args == roll_args_id && *from == window_from));
        for row in rows {
            t.roll_results
                .insert((row.roll_args_id, row.window_from, row.trade_args_id), *row);
        }
        Ok(rows.len())
    }

    fn roll_results(
        &self,
        roll_args_id: RollArgsId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RollResult>, CoreError> {
        let t = self.read();
        let lo = (roll_args_id, NaiveDate::MIN, TradeArgsId(0));
        let hi = (roll_args_id, to, TradeArgsId(0));
        let mut rows: Vec<RollResult> = t
            .roll_results
            .range(lo..hi)
            .map(|(_, r)| *r)
            .filter(|r| r.window_to > from)
            .collect();
        rows.sort_by_key(|r| (r.window_from, r.predict_rank, r.trade_args_id));
        Ok(rows)
    }

    fn upsert_roll_merged(&self, rows: &[RollMerged]) -> Result<usize, CoreError> {
        let mut t = self.write();
        for row in rows {
            t.roll_merged
                .entry((row.roll_args_id, row.top, row.dt))
                .and_modify(|existing| existing.position = row.position)
                .or_insert(*row);
        }
        Ok(rows.len())
    }

    fn roll_merged(
        &self,
        roll_args_id: RollArgsId,
        top: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RollMerged>, CoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(self
            .read()
            .roll_merged
            .range((roll_args_id, top, day_start(from))..(roll_args_id, top, day_start(to)))
            .map(|(_, m)| *m)
            .collect())
    }

    fn upsert_roll_export(&self, export: &RollExport) -> Result<(), CoreError> {
        self.write()
            .roll_exports
            .insert(export.export_id.clone(), export.clone());
        Ok(())
    }

    fn roll_export(&self, id: &ExportId) -> Result<RollExport, CoreError> {
        self.read()
            .roll_exports
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("roll export", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NormMethod, Zone, THRESHOLD_OFF};

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

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn trade_args_catalog_dedupes_by_fingerprint() {
        let store = MemoryStore::new();
        let a = store.insert_trade_args(&params(-0.3)).unwrap();
        let b = store.insert_trade_args(&params(-0.4)).unwrap();
        let again = store.insert_trade_args(&params(-0.3)).unwrap();
        assert_eq!(a, TradeArgsId(1));
        assert_eq!(b, TradeArgsId(2));
        assert_eq!(again, a);
        assert_eq!(store.trade_args_range(a, b).unwrap().len(), 2);
    }

    #[test]
    fn invalid_trade_args_rejected() {
        let store = MemoryStore::new();
        let mut p = params(THRESHOLD_OFF);
        p.short_open = THRESHOLD_OFF;
        assert!(matches!(store.insert_trade_args(&p), Err(CoreError::Config(_))));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        assert!(store.dataset(DatasetId(9)).unwrap_err().is_data_absence());
        assert!(store.roll_args(RollArgsId(9)).unwrap_err().is_data_absence());
        assert!(store
            .upsert_ratio_ticks(DatasetId(9), &[])
            .unwrap_err()
            .is_data_absence());
    }

    #[test]
    fn ratio_series_is_half_open() {
        let store = MemoryStore::new();
        let id = store.insert_dataset("159915", 1, "atm").unwrap();
        let ticks: Vec<RatioTick> = (8..=10)
            .map(|d| RatioTick {
                dt: date(d).and_hms_opt(9, 31, 0).unwrap(),
                ratio: 1.0,
                ratio_diff: 0.0,
            })
            .collect();
        store.upsert_ratio_ticks(id, &ticks).unwrap();
        assert_eq!(store.ratio_series(id, date(8), date(10)).unwrap().len(), 2);
        assert_eq!(store.insert_dataset("159915", 1, "atm").unwrap(), id);
    }

    #[test]
    fn roll_merged_upsert_updates_position_only() {
        let store = MemoryStore::new();
        let dt = date(8).and_hms_opt(9, 31, 0).unwrap();
        let row = RollMerged {
            roll_args_id: RollArgsId(1),
            top: 5,
            dt,
            position: 0.5,
        };
        store.upsert_roll_merged(&[row]).unwrap();
        store
            .upsert_roll_merged(&[RollMerged { position: -0.2, ..row }])
            .unwrap();
        let rows = store.roll_merged(RollArgsId(1), 5, date(8), date(9)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].position, -0.2);
    }

    #[test]
    fn roll_results_select_overlapping_windows() {
        let store = MemoryStore::new();
        let row = |from: u32, to: u32| RollResult {
            roll_args_id: RollArgsId(1),
            window_from: date(from),
            window_to: date(to),
            trade_args_id: TradeArgsId(1),
            predict_rank: 1,
            predict_weight: 1.0,
            real_rank: None,
            real_weight: None,
        };
        store
            .upsert_roll_results(&[row(1, 8), row(8, 15), row(15, 22)])
            .unwrap();
        let hits = store.roll_results(RollArgsId(1), date(10), date(12)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].window_from, date(8));
        assert_eq!(store.roll_results(RollArgsId(1), date(7), date(16)).unwrap().len(), 3);
    }

    #[test]
    fn replace_roll_window_drops_stale_picks() {
        let store = MemoryStore::new();
        let row = |from: u32, id: u64| RollResult {
            roll_args_id: RollArgsId(1),
            window_from: date(from),
            window_to: date(from + 7),
            trade_args_id: TradeArgsId(id),
            predict_rank: 1,
            predict_weight: 1.0,
            real_rank: None,
            real_weight: None,
        };
        store.upsert_roll_results(&[row(1, 2), row(8, 2)]).unwrap();

        store.replace_roll_window(RollArgsId(1), date(8), &[row(8, 1)]).unwrap();
        let week = store.roll_results(RollArgsId(1), date(8), date(15)).unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].trade_args_id, TradeArgsId(1));
        // Other windows are untouched.
        assert_eq!(store.roll_results(RollArgsId(1), date(1), date(8)).unwrap().len(), 1);

        store.replace_roll_window(RollArgsId(1), date(8), &[]).unwrap();
        assert!(store.roll_results(RollArgsId(1), date(8), date(15)).unwrap().is_empty());

        let err = store
            .replace_roll_window(RollArgsId(1), date(15), &[row(8, 3)])
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn day_outputs_replace_and_filter() {
        let store = MemoryStore::new();
        let id = TradeArgsId(1);
        let record = PositionRecord {
            trade_args_id: id,
            dt: date(8).and_hms_opt(9, 31, 0).unwrap(),
            zone: Zone::Close,
            position: 0,
        };
        let out = DayOutput {
            trade_args_id: id,
            date: date(8),
            positions: vec![record],
            trades: Vec::new(),
        };
        store.upsert_day_output(out.clone()).unwrap();
        store.upsert_day_output(out).unwrap();
        assert!(store.has_day_output(id, date(8)).unwrap());
        assert!(!store.has_day_output(id, date(9)).unwrap());
        assert_eq!(store.positions(id, date(1), date(31)).unwrap().len(), 1);
    }
}

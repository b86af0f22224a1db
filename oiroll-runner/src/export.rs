//! Export and replay of frozen weekly selections.
//!
//! An export pins one ISO week of a roll: the selected TradeArgs, their
//! renormalized weights and their trigger tables resolved against the clip
//! history. The resulting JSON document carries no reference to the store,
//! so a consumer holding only the document and a ratio feed can replay the
//! production position stream.
//!
//! The document is content-addressed: `export_id` is the BLAKE3 digest of
//! the JSON form with an empty `export_id`. Loading verifies both the schema
//! version and the digest.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use oiroll_core::calendar::{same_iso_week, week_monday, SessionCalendar};
use oiroll_core::domain::{
    ExportId, PositionRecord, RatioSeries, RollArgsId, RollExport, RollResult, TradeArgsDetail,
    TradeArgsId, EXPORT_SCHEMA_VERSION,
};
use oiroll_core::normalize::ClipCache;
use oiroll_core::signal::{ClipResolver, SignalMachine};
use oiroll_core::store::Store;
use oiroll_core::CoreError;

use crate::backtest::day_after;
use crate::merge::{quantize, weighted_sum_by_timestamp};
use crate::ranking::renormalize;
use crate::roll::WEIGHT_SUM_EPSILON;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("unsupported export schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("export id mismatch: document says {stated}, content hashes to {computed}")]
    IdMismatch { stated: ExportId, computed: ExportId },

    #[error("export JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ─── Export ──────────────────────────────────────────────────────────

/// Freeze the top-`top` selection of `roll_args_id` for `dt_from..=dt_to`.
///
/// The range must lie inside a single ISO week and be covered by one stored
/// roll window. The document is upserted to the store and returned.
pub fn export(
    store: &dyn Store,
    calendar: &SessionCalendar,
    roll_args_id: RollArgsId,
    top: u32,
    dt_from: NaiveDate,
    dt_to: NaiveDate,
) -> Result<RollExport, ExportError> {
    if dt_from > dt_to {
        return Err(ExportError::InvalidRequest(format!(
            "range is empty: {dt_from} > {dt_to}"
        )));
    }
    if !same_iso_week(dt_from, dt_to) {
        return Err(ExportError::InvalidRequest(format!(
            "{dt_from}..={dt_to} spans more than one ISO week"
        )));
    }
    if top == 0 {
        return Err(ExportError::InvalidRequest("top must be > 0".into()));
    }

    let args = store.roll_args(roll_args_id)?;
    store.roll_method(args.params.roll_method_id)?;
    let dataset = store.dataset(args.params.dataset_id)?;

    let results = store.roll_results(roll_args_id, dt_from, day_after(dt_to))?;
    let window = covering_window(&results, dt_from, dt_to).ok_or_else(|| {
        CoreError::no_data(format!(
            "roll args {roll_args_id} has no window covering {dt_from}..={dt_to}"
        ))
    })?;
    let mut weights: Vec<(TradeArgsId, f64)> = window
        .iter()
        .filter(|r| r.predict_rank <= top)
        .map(|r| (r.trade_args_id, r.predict_weight))
        .collect();
    if weights.is_empty() {
        return Err(CoreError::no_data(format!(
            "roll args {roll_args_id} selected nothing within top {top} for {dt_from}"
        ))
        .into());
    }
    let raw_sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if raw_sum > 1.0 + WEIGHT_SUM_EPSILON {
        warn!(roll_args = %roll_args_id, top, weight_sum = raw_sum, "stored selection weights exceed 1");
    }
    renormalize(&mut weights);

    let selected = weights
        .iter()
        .map(|(id, _)| store.trade_args(*id))
        .collect::<Result<Vec<_>, _>>()?;
    let max_train = selected.iter().map(|ta| ta.params.train_days).max().unwrap_or(0);
    let monday = week_monday(dt_from);
    let history = store.ratio_series(dataset.id, monday - Duration::days(max_train as i64), monday)?;

    let cache = ClipCache::new();
    let resolver = ClipResolver::new(dataset.id, &history, &cache, calendar);
    let mut details = Vec::with_capacity(selected.len());
    for ta in &selected {
        details.push(TradeArgsDetail {
            trade_args_id: ta.id,
            noon_close: ta.params.noon_close,
            trigger: resolver.trigger_table(&ta.params, dt_from)?,
        });
    }
    if cache.builds() > 0 {
        store.upsert_clips(&cache.snapshot())?;
    }

    let mut doc = RollExport {
        schema_version: EXPORT_SCHEMA_VERSION,
        export_id: ExportId(String::new()),
        roll_args_id,
        roll_top: top,
        spotcode: dataset.spotcode.clone(),
        dataset_id: dataset.id,
        input_dt_from: dt_from,
        input_dt_to: dt_to,
        trade_args: weights.into_iter().collect(),
        trade_args_details: details,
    };
    doc.export_id = content_id(&doc)?;
    store.upsert_roll_export(&doc)?;
    info!(
        roll_args = %roll_args_id,
        top,
        week = %monday,
        selected = doc.trade_args.len(),
        export_id = %doc.export_id,
        "exported selection"
    );
    Ok(doc)
}

/// The window group whose validation period covers `from..=to`.
fn covering_window(results: &[RollResult], from: NaiveDate, to: NaiveDate) -> Option<&[RollResult]> {
    results
        .chunk_by(|a, b| a.window_from == b.window_from)
        .find(|w| w[0].window_from <= from && w[0].window_to > to)
}

/// BLAKE3 digest of the document's JSON form with `export_id` blanked.
pub fn content_id(doc: &RollExport) -> Result<ExportId, ExportError> {
    let mut blank = doc.clone();
    blank.export_id = ExportId(String::new());
    let bytes = serde_json::to_vec(&blank)?;
    Ok(ExportId::from_bytes(&bytes))
}

// ─── Document I/O ────────────────────────────────────────────────────

pub fn to_json(doc: &RollExport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Parse a document, rejecting unknown schema versions and tampered content.
pub fn from_json(json: &str) -> Result<RollExport, ExportError> {
    let doc: RollExport = serde_json::from_str(json)?;
    verify(&doc)?;
    Ok(doc)
}

pub fn verify(doc: &RollExport) -> Result<(), ExportError> {
    if doc.schema_version != EXPORT_SCHEMA_VERSION {
        return Err(ExportError::UnsupportedVersion {
            found: doc.schema_version,
            expected: EXPORT_SCHEMA_VERSION,
        });
    }
    let computed = content_id(doc)?;
    if computed != doc.export_id {
        return Err(ExportError::IdMismatch {
            stated: doc.export_id.clone(),
            computed,
        });
    }
    Ok(())
}

pub fn write_file(doc: &RollExport, path: &Path) -> Result<(), ExportError> {
    let json = to_json(doc)?;
    fs::write(path, json).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_file(path: &Path) -> Result<RollExport, ExportError> {
    let json = fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_json(&json)
}

// ─── Replay ──────────────────────────────────────────────────────────

/// Positions reproduced from a frozen document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutput {
    pub positions: BTreeMap<TradeArgsId, Vec<PositionRecord>>,
    /// Weighted blend per tick.
    pub blended: Vec<(NaiveDateTime, f64)>,
}

/// Run the state machine over `series` using only the document's trigger
/// tables. Ticks outside the document's date range are ignored.
pub fn replay(
    doc: &RollExport,
    series: &RatioSeries,
    calendar: &SessionCalendar,
) -> Result<ReplayOutput, ExportError> {
    if doc.schema_version != EXPORT_SCHEMA_VERSION {
        return Err(ExportError::UnsupportedVersion {
            found: doc.schema_version,
            expected: EXPORT_SCHEMA_VERSION,
        });
    }
    let ticks = series.range(doc.input_dt_from, day_after(doc.input_dt_to));
    let machine = SignalMachine::new(calendar);

    let mut out = ReplayOutput::default();
    let mut streams = Vec::with_capacity(doc.trade_args_details.len());
    for detail in &doc.trade_args_details {
        let weight = doc
            .trade_args
            .get(&detail.trade_args_id)
            .copied()
            .ok_or_else(|| {
                ExportError::InvalidRequest(format!(
                    "trade args {} has thresholds but no weight",
                    detail.trade_args_id
                ))
            })?;
        let records = machine.run_days(detail.trade_args_id, detail.noon_close, ticks, |_| {
            Ok(detail.trigger.clone())
        })?;
        debug!(trade_args = %detail.trade_args_id, ticks = records.len(), "replayed");
        streams.push((weight, records.clone()));
        out.positions.insert(detail.trade_args_id, records);
    }
    out.blended = weighted_sum_by_timestamp(&streams)
        .into_iter()
        .map(|(dt, blend)| (dt, quantize(blend.position)))
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oiroll_core::domain::{DatasetId, TriggerRow, TriggerTable};
    use chrono::NaiveTime;

    fn doc() -> RollExport {
        let row = TriggerRow {
            time: NaiveTime::from_hms_opt(9, 31, 0).unwrap(),
            long_open: Some(-1.0),
            long_close: Some(-0.5),
            short_open: None,
            short_close: None,
        };
        let mut doc = RollExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            export_id: ExportId(String::new()),
            roll_args_id: RollArgsId(1),
            roll_top: 10,
            spotcode: "159915".into(),
            dataset_id: DatasetId(1),
            input_dt_from: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            input_dt_to: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            trade_args: [(TradeArgsId(3), 1.0)].into_iter().collect(),
            trade_args_details: vec![TradeArgsDetail {
                trade_args_id: TradeArgsId(3),
                noon_close: false,
                trigger: TriggerTable::from_rows(vec![row]),
            }],
        };
        doc.export_id = content_id(&doc).unwrap();
        doc
    }

    #[test]
    fn json_round_trip_verifies() {
        let doc = doc();
        let back = from_json(&to_json(&doc).unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn tampered_weights_are_detected() {
        let mut doc = doc();
        doc.trade_args.insert(TradeArgsId(3), 0.5);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(matches!(from_json(&json), Err(ExportError::IdMismatch { .. })));
    }

    #[test]
    fn future_schema_rejected() {
        let mut doc = doc();
        doc.schema_version = EXPORT_SCHEMA_VERSION + 1;
        doc.export_id = content_id(&doc).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(matches!(
            from_json(&json),
            Err(ExportError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("week.json");
        let doc = doc();
        write_file(&doc, &path).unwrap();
        assert_eq!(read_file(&path).unwrap(), doc);
    }
}

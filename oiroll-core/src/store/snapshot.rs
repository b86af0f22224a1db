//! JSON snapshot persistence for `MemoryStore`.
//!
//! The whole store round-trips through one JSON document. Writes are atomic:
//! serialize to `{path}.tmp`, then rename into place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::{DayOutput, MemoryStore};
use crate::domain::{
    Dataset, DatasetId, PriceTick, RatioTick, RollArgs, RollExport, RollMerged, RollMethod,
    RollResult, TradeArgs,
};
use crate::error::CoreError;
use crate::normalize::{ClipKey, ClipTable};

/// Current snapshot schema version. Unknown versions are rejected on load.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Row-oriented image of every store table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub ratio_ticks: Vec<(DatasetId, RatioTick)>,
    #[serde(default)]
    pub prices: Vec<(String, PriceTick)>,
    #[serde(default)]
    pub clips: Vec<(ClipKey, ClipTable)>,
    #[serde(default)]
    pub trade_args: Vec<TradeArgs>,
    #[serde(default)]
    pub day_outputs: Vec<DayOutput>,
    #[serde(default)]
    pub roll_methods: Vec<RollMethod>,
    #[serde(default)]
    pub roll_args: Vec<RollArgs>,
    #[serde(default)]
    pub roll_results: Vec<RollResult>,
    #[serde(default)]
    pub roll_merged: Vec<RollMerged>,
    #[serde(default)]
    pub roll_exports: Vec<RollExport>,
}

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

impl MemoryStore {
    /// Load a snapshot file. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(CoreError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        let snapshot: StoreSnapshot = serde_json::from_str(&json)
            .map_err(|e| CoreError::Storage(format!("invalid snapshot {}: {e}", path.display())))?;
        let store = Self::from_snapshot(snapshot)?;
        tracing::debug!(path = %path.display(), "loaded store snapshot");
        Ok(store)
    }

    /// Write the store to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string(&self.to_snapshot())
            .map_err(|e| CoreError::Storage(format!("snapshot serialization: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::Storage(format!("failed to create dir: {e}")))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| CoreError::Storage(format!("failed to write {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CoreError::Storage(format!("atomic rename failed: {e}"))
        })?;
        tracing::debug!(path = %path.display(), "saved store snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NormMethod, TradeArgsParams, THRESHOLD_OFF};
    use crate::store::Store;
    use chrono::NaiveDate;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let ds = store.insert_dataset("159915", 1, "atm").unwrap();
        store
            .upsert_ratio_ticks(
                ds,
                &[RatioTick {
                    dt: NaiveDate::from_ymd_opt(2024, 1, 8)
                        .unwrap()
                        .and_hms_opt(9, 31, 0)
                        .unwrap(),
                    ratio: 1.25,
                    ratio_diff: 0.0,
                }],
            )
            .unwrap();
        store
            .insert_trade_args(&TradeArgsParams {
                method: NormMethod::z_score(2),
                train_days: 28,
                zero_threshold: 0.5,
                long_open: -0.35,
                long_close: -0.1,
                short_open: THRESHOLD_OFF,
                short_close: THRESHOLD_OFF,
                noon_close: true,
            })
            .unwrap();
        store
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = seeded();
        store.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.to_snapshot(), store.to_snapshot());
    }

    #[test]
    fn loaded_store_keeps_deduplicating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = seeded();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        let params = loaded.trade_args(crate::domain::TradeArgsId(1)).unwrap().params;
        assert_eq!(
            loaded.insert_trade_args(&params).unwrap(),
            crate::domain::TradeArgsId(1)
        );
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.to_snapshot(), StoreSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            ..StoreSnapshot::default()
        });
    }

    #[test]
    fn unknown_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"schema_version": 99}"#).unwrap();
        assert!(matches!(MemoryStore::load(&path), Err(CoreError::Storage(_))));
    }
}

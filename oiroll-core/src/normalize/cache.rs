//! Process-local clip cache.
//!
//! Read-through and never invalidated: an instance lives for one
//! optimization run and is injected into every component that resolves
//! thresholds. A new run starts with a new cache.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::clip::ClipTable;
use crate::domain::{DatasetId, NormMethod};
use crate::error::CoreError;

/// Natural key of a clip table. The training window is `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipKey {
    pub dataset_id: DatasetId,
    pub method: NormMethod,
    pub time: NaiveTime,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Default)]
pub struct ClipCache {
    entries: RwLock<HashMap<ClipKey, Arc<ClipTable>>>,
    builds: AtomicUsize,
}

impl ClipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ClipKey) -> Option<Arc<ClipTable>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Return the cached table or build, cache and return it. Failed builds
    /// are not cached.
    pub fn get_or_build<F>(&self, key: ClipKey, build: F) -> Result<Arc<ClipTable>, CoreError>
    where
        F: FnOnce() -> Result<ClipTable, CoreError>,
    {
        if let Some(table) = self.get(&key) {
            return Ok(table);
        }
        let table = Arc::new(build()?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Another worker may have raced us here; keep whichever landed first.
        Ok(entries.entry(key).or_insert(table).clone())
    }

    /// Number of tables built (not hit) by this cache.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<(ClipKey, ClipTable)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<(ClipKey, ClipTable)> = entries
            .iter()
            .map(|(k, v)| (*k, ClipTable::clone(v)))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }
}

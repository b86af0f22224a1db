//! TradeArgs — one concrete threshold configuration ("strategy variant").
//!
//! Thresholds are percentile offsets from `zero_threshold`. At signal time
//! each offset is turned into a percentile (`zero + offset`, clamped to
//! `[0, 1]`) and looked up in the ClipTable for that minute, yielding the raw
//! `ratio_diff` trigger. An offset `>= THRESHOLD_OFF` disables the threshold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::ids::TradeArgsId;
use crate::error::CoreError;

/// Sentinel: any threshold offset at or above this value is disabled.
pub const THRESHOLD_OFF: f64 = 9.0;

/// Normalization family used to build clip tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormFamily {
    /// Min-max scaling with an optional symmetric percentile clamp.
    MinMax,
    /// Average-rank percentile.
    Rank,
    /// Z-score clamped to ±k sigma, rescaled to [0, 1].
    ZScore,
}

/// A normalization family plus its variation parameter.
///
/// - `MinMax`: `variation` is the clamp percentile in percent (0 = plain min/max).
/// - `Rank`: `variation` is unused and kept at 0.
/// - `ZScore`: `variation` is the sigma clamp `k` (0 = 3 sigma).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormMethod {
    pub family: NormFamily,
    pub variation: u32,
}

impl NormMethod {
    pub fn min_max(clamp_pct: u32) -> Self {
        Self {
            family: NormFamily::MinMax,
            variation: clamp_pct,
        }
    }

    pub fn rank() -> Self {
        Self {
            family: NormFamily::Rank,
            variation: 0,
        }
    }

    pub fn z_score(sigma: u32) -> Self {
        Self {
            family: NormFamily::ZScore,
            variation: sigma,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self.family {
            NormFamily::MinMax if self.variation >= 50 => Err(CoreError::Config(format!(
                "min-max clamp percentile must be < 50, got {}",
                self.variation
            ))),
            NormFamily::Rank if self.variation != 0 => Err(CoreError::Config(
                "rank normalization takes no variation".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for NormMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.family {
            NormFamily::MinMax => "minmax",
            NormFamily::Rank => "rank",
            NormFamily::ZScore => "zscore",
        };
        write!(f, "{family}_{}", self.variation)
    }
}

/// Which sides of the book a configuration may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideMode {
    Both,
    LongOnly,
    ShortOnly,
}

/// The content of a TradeArgs entry, without its catalog ID.
///
/// Equality and hashing use the exact bit patterns of the float fields so the
/// value can key caches and catalog deduplication.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeArgsParams {
    pub method: NormMethod,
    /// Trailing clip window length in calendar days.
    pub train_days: u32,
    pub zero_threshold: f64,
    pub long_open: f64,
    pub long_close: f64,
    pub short_open: f64,
    pub short_close: f64,
    /// Flatten before the lunch break instead of holding through it.
    pub noon_close: bool,
}

impl TradeArgsParams {
    /// Reject configurations that can never trade or cannot be resolved.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.method.validate()?;
        if self.train_days == 0 {
            return Err(CoreError::Config("train_days must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.zero_threshold) {
            return Err(CoreError::Config(format!(
                "zero_threshold must be within [0, 1], got {}",
                self.zero_threshold
            )));
        }
        let offsets = [self.long_open, self.long_close, self.short_open, self.short_close];
        if offsets.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::Config("threshold offsets must be finite".into()));
        }
        if !self.long_enabled() && !self.short_enabled() {
            return Err(CoreError::Config(
                "both long_open and short_open are disabled".into(),
            ));
        }
        Ok(())
    }

    pub fn long_enabled(&self) -> bool {
        !is_off(self.long_open)
    }

    pub fn short_enabled(&self) -> bool {
        !is_off(self.short_open)
    }

    pub fn side_mode(&self) -> SideMode {
        match (self.long_enabled(), self.short_enabled()) {
            (true, false) => SideMode::LongOnly,
            (false, true) => SideMode::ShortOnly,
            _ => SideMode::Both,
        }
    }

    /// Percentile a threshold offset resolves to, or `None` when disabled.
    pub fn percentile_for(&self, offset: f64) -> Option<f64> {
        if is_off(offset) {
            None
        } else {
            Some((self.zero_threshold + offset).clamp(0.0, 1.0))
        }
    }

    fn key_bits(&self) -> (NormMethod, u32, [u64; 5], bool) {
        (
            self.method,
            self.train_days,
            [
                self.zero_threshold.to_bits(),
                self.long_open.to_bits(),
                self.long_close.to_bits(),
                self.short_open.to_bits(),
                self.short_close.to_bits(),
            ],
            self.noon_close,
        )
    }
}

impl PartialEq for TradeArgsParams {
    fn eq(&self, other: &Self) -> bool {
        self.key_bits() == other.key_bits()
    }
}

impl Eq for TradeArgsParams {}

impl Hash for TradeArgsParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_bits().hash(state);
    }
}

/// A cataloged configuration: stable ID plus immutable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeArgs {
    pub id: TradeArgsId,
    pub params: TradeArgsParams,
}

pub fn is_off(offset: f64) -> bool {
    offset >= THRESHOLD_OFF
}

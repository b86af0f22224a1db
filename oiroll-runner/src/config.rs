//! Run configuration — one TOML file, every field defaulted.
//!
//! ```toml
//! [calendar]
//! entry_cutoff = "14:55:00"
//!
//! [backtest]
//! fee_rate = 0.0002
//! parallel = true
//!
//! [merge]
//! weight_tolerance = 1e-6
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use oiroll_core::calendar::SessionCalendar;

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Backtest sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    /// Round-trip fee subtracted from every trade's percent return.
    pub fee_rate: f64,
    /// Fan units out over the rayon pool.
    pub parallel: bool,
    /// Recompute units that already have stored output.
    pub force: bool,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            fee_rate: 0.0,
            parallel: true,
            force: false,
        }
    }
}

/// Ensemble merge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSection {
    /// How far a timestamp's weight sum may stray from 0 or 1.
    pub weight_tolerance: f64,
}

impl Default for MergeSection {
    fn default() -> Self {
        Self {
            weight_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub calendar: SessionCalendar,
    pub backtest: BacktestSection,
    pub merge: MergeSection,
    pub logging: LoggingSection,
}

impl RunConfig {
    /// Load from a TOML file. A missing file means defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calendar
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !self.backtest.fee_rate.is_finite() || !(0.0..1.0).contains(&self.backtest.fee_rate) {
            return Err(ConfigError::Invalid(format!(
                "backtest.fee_rate must be within [0, 1), got {}",
                self.backtest.fee_rate
            )));
        }
        let tol = self.merge.weight_tolerance;
        if !tol.is_finite() || tol <= 0.0 || tol >= 0.5 {
            return Err(ConfigError::Invalid(format!(
                "merge.weight_tolerance must be within (0, 0.5), got {tol}"
            )));
        }
        Ok(())
    }
}

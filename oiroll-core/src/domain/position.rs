//! Position records emitted by the signal state machine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::TradeArgsId;

/// Why the state machine holds its current position on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    LongOpen,
    LongHold,
    ShortOpen,
    ShortHold,
    Close,
}

impl Zone {
    /// Label used when a gated tick carries a position forward unchanged.
    pub fn hold_for(position: i8) -> Self {
        match position.signum() {
            1 => Self::LongHold,
            -1 => Self::ShortHold,
            _ => Self::Close,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LongOpen => "long_open",
            Self::LongHold => "long_hold",
            Self::ShortOpen => "short_open",
            Self::ShortHold => "short_hold",
            Self::Close => "close",
        };
        f.write_str(label)
    }
}

/// One tick of a configuration's position sequence. `position ∈ {-1, 0, 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionRecord {
    pub trade_args_id: TradeArgsId,
    pub dt: NaiveDateTime,
    pub zone: Zone,
    pub position: i8,
}

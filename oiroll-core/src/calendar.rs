//! Trading-session calendar policy and week arithmetic.
//!
//! Every wall-clock rule the state machine applies lives in one
//! `SessionCalendar` value: session bounds, the lunch gap, the late-session
//! entry cutoff, and the noon-close window. Strategies differ only by their
//! `noon_close` flag.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How the state machine must treat a tick at a given time-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Normal transition table applies.
    Open,
    /// No new positions; carry the previous position forward.
    Propagate,
    /// Position forced to zero.
    ForceFlat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCalendar {
    pub morning_open: NaiveTime,
    pub morning_close: NaiveTime,
    pub afternoon_open: NaiveTime,
    pub afternoon_close: NaiveTime,
    /// Ticks at or after this time never open positions.
    pub entry_cutoff: NaiveTime,
    /// With `noon_close`, ticks in `[noon_close_start, afternoon_open)` are flat.
    pub noon_close_start: NaiveTime,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self {
            morning_open: hm(9, 30),
            morning_close: hm(11, 30),
            afternoon_open: hm(13, 0),
            afternoon_close: hm(15, 0),
            entry_cutoff: hm(14, 55),
            noon_close_start: hm(11, 25),
        }
    }
}

impl SessionCalendar {
    pub fn validate(&self) -> Result<(), CoreError> {
        let ordered = self.morning_open < self.morning_close
            && self.morning_close <= self.afternoon_open
            && self.afternoon_open < self.afternoon_close;
        if !ordered {
            return Err(CoreError::Config("session times are not ordered".into()));
        }
        if self.entry_cutoff <= self.afternoon_open || self.entry_cutoff > self.afternoon_close {
            return Err(CoreError::Config(
                "entry_cutoff must fall inside the afternoon session".into(),
            ));
        }
        if self.noon_close_start < self.morning_open || self.noon_close_start > self.morning_close
        {
            return Err(CoreError::Config(
                "noon_close_start must fall inside the morning session".into(),
            ));
        }
        Ok(())
    }

    /// Gate for a tick at `time` under a strategy's `noon_close` flag.
    pub fn gate(&self, time: NaiveTime, noon_close: bool) -> Gate {
        if time >= self.afternoon_close {
            return Gate::ForceFlat;
        }
        if noon_close && time >= self.noon_close_start && time < self.afternoon_open {
            return Gate::ForceFlat;
        }
        if time > self.morning_close && time < self.afternoon_open {
            return Gate::Propagate;
        }
        if time >= self.entry_cutoff || time < self.morning_open {
            return Gate::Propagate;
        }
        Gate::Open
    }

    /// Every minute of both sessions, bounds included.
    pub fn session_minutes(&self) -> Vec<NaiveTime> {
        let mut minutes = Vec::with_capacity(242);
        for (start, end) in [
            (self.morning_open, self.morning_close),
            (self.afternoon_open, self.afternoon_close),
        ] {
            let mut t = start;
            while t <= end {
                minutes.push(t);
                t += Duration::minutes(1);
            }
        }
        minutes
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

// ─── Week arithmetic ─────────────────────────────────────────────────

/// Monday of the ISO week containing `date`.
pub fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// True when both dates fall in the same ISO week.
pub fn same_iso_week(a: NaiveDate, b: NaiveDate) -> bool {
    a.iso_week() == b.iso_week()
}

/// The most recent Friday strictly before `today`.
///
/// Scheduled re-optimization runs end their range here so the last window
/// always covers a complete trading week.
pub fn last_friday_before(today: NaiveDate) -> NaiveDate {
    let mut d = today - Duration::days(1);
    while d.weekday() != Weekday::Fri {
        d -= Duration::days(1);
    }
    d
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// `date` shifted by `months` calendar months (day clamped to the 1st).
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let start = month_start(date);
    let total = start.year() * 12 + start.month0() as i32 + months;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    NaiveDate::from_ymd_opt(year, month0 + 1, 1).unwrap_or(start)
}

//! Signal state machine — three states, one deterministic transition table.
//!
//! State is the current position only. Each tick is first gated by the
//! session calendar; open ticks go through `transition`, gated ticks carry
//! the position forward or force it flat.

use chrono::NaiveDate;

use crate::calendar::{Gate, SessionCalendar};
use crate::domain::{PositionRecord, RatioTick, TradeArgsId, TriggerRow, TriggerTable, Zone};
use crate::error::CoreError;

/// Pure transition: `(position, ratio_diff, triggers) → (zone, position)`.
///
/// - from `0`: long if `long_open` fires, else short if `short_open` fires
/// - from `1`: stay on `long_open` or `long_hold`, flip on `short_open`, else flat
/// - from `-1`: mirror image
pub fn transition(position: i8, value: f64, row: &TriggerRow) -> (Zone, i8) {
    let long_open = row.long_open.is_some_and(|t| value <= t);
    let long_hold = row.long_close.is_some_and(|t| value <= t);
    let short_open = row.short_open.is_some_and(|t| value >= t);
    let short_hold = row.short_close.is_some_and(|t| value >= t);

    match position.signum() {
        1 => {
            if long_open {
                (Zone::LongOpen, 1)
            } else if long_hold {
                (Zone::LongHold, 1)
            } else if short_open {
                (Zone::ShortOpen, -1)
            } else {
                (Zone::Close, 0)
            }
        }
        -1 => {
            if short_open {
                (Zone::ShortOpen, -1)
            } else if short_hold {
                (Zone::ShortHold, -1)
            } else if long_open {
                (Zone::LongOpen, 1)
            } else {
                (Zone::Close, 0)
            }
        }
        _ => {
            if long_open {
                (Zone::LongOpen, 1)
            } else if short_open {
                (Zone::ShortOpen, -1)
            } else {
                (Zone::Close, 0)
            }
        }
    }
}

/// Runs one configuration over one trading day.
#[derive(Debug, Clone, Copy)]
pub struct SignalMachine<'a> {
    calendar: &'a SessionCalendar,
}

impl<'a> SignalMachine<'a> {
    pub fn new(calendar: &'a SessionCalendar) -> Self {
        Self { calendar }
    }

    /// Emit one record per tick. Every day starts flat.
    ///
    /// `ticks` must belong to a single trading day. An open tick whose
    /// minute has no trigger row fails the whole day with `NoData`.
    pub fn run_day(
        &self,
        trade_args_id: TradeArgsId,
        noon_close: bool,
        ticks: &[RatioTick],
        triggers: &TriggerTable,
    ) -> Result<Vec<PositionRecord>, CoreError> {
        let date = match ticks.first() {
            Some(t) => t.dt.date(),
            None => return Ok(Vec::new()),
        };
        if ticks.iter().any(|t| t.dt.date() != date) {
            return Err(CoreError::Config(format!(
                "run_day received ticks from more than one day (starting {date})"
            )));
        }

        let mut position: i8 = 0;
        let mut records = Vec::with_capacity(ticks.len());
        for tick in ticks {
            let time = tick.dt.time();
            let gate = match self.calendar.gate(time, noon_close) {
                Gate::Open if !tick.ratio_diff.is_finite() => Gate::Propagate,
                g => g,
            };
            let (zone, next) = match gate {
                Gate::ForceFlat => (Zone::Close, 0),
                Gate::Propagate => (Zone::hold_for(position), position),
                Gate::Open => {
                    let row = triggers.get(time).ok_or_else(|| {
                        CoreError::no_data(format!(
                            "no trigger for trade args {trade_args_id} at {date} {time}"
                        ))
                    })?;
                    transition(position, tick.ratio_diff, row)
                }
            };
            position = next;
            records.push(PositionRecord {
                trade_args_id,
                dt: tick.dt,
                zone,
                position,
            });
        }
        Ok(records)
    }

    /// Run every day in `ticks`, resolving a trigger table per day.
    pub fn run_days<F>(
        &self,
        trade_args_id: TradeArgsId,
        noon_close: bool,
        ticks: &[RatioTick],
        mut triggers_for: F,
    ) -> Result<Vec<PositionRecord>, CoreError>
    where
        F: FnMut(NaiveDate) -> Result<TriggerTable, CoreError>,
    {
        let mut out = Vec::with_capacity(ticks.len());
        for day in ticks.chunk_by(|a, b| a.dt.date() == b.dt.date()) {
            let table = triggers_for(day[0].dt.date())?;
            out.extend(self.run_day(trade_args_id, noon_close, day, &table)?);
        }
        Ok(out)
    }
}

//! Rolling train/validate windows.
//!
//! Each window has a validation period and the training period that
//! immediately precedes it. Alignment depends on `validate_days`:
//! - `7`: Monday on or before `dt_from`, one-week stride
//! - `14`: same Monday, two-week stride
//! - `30`: first of the month, calendar-month windows; training is the
//!   preceding `train_days_factor` months
//! - anything else: raw `dt_from` with a `validate_days` stride
//!
//! All periods are half-open `[from, to)`.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use oiroll_core::calendar::{add_months, month_start, week_monday};
use oiroll_core::domain::RollMethodParams;

use crate::backtest::day_after;

/// One rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollWindow {
    pub index: usize,
    pub train_from: NaiveDate,
    pub train_to: NaiveDate,
    pub validate_from: NaiveDate,
    pub validate_to: NaiveDate,
    /// The validation period runs past the requested range, so there is
    /// nothing to score it against yet.
    pub is_final: bool,
}

/// Windows whose validation period starts in `dt_from..=dt_to`, in
/// chronological order.
pub fn create_windows(method: &RollMethodParams, dt_from: NaiveDate, dt_to: NaiveDate) -> Vec<RollWindow> {
    if dt_from > dt_to || method.validate_days == 0 {
        return Vec::new();
    }
    let end = day_after(dt_to);
    let factor = method.train_days_factor as i32;

    let mut windows = Vec::new();
    let mut start = match method.validate_days {
        7 | 14 => week_monday(dt_from),
        30 => month_start(dt_from),
        _ => dt_from,
    };
    while start <= dt_to {
        let (train_from, validate_to) = match method.validate_days {
            30 => (add_months(start, -factor), add_months(start, 1)),
            days => (
                start - Duration::days(method.train_days() as i64),
                start + Duration::days(days as i64),
            ),
        };
        windows.push(RollWindow {
            index: windows.len(),
            train_from,
            train_to: start,
            validate_from: start,
            validate_to,
            is_final: validate_to > end,
        });
        start = validate_to;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};
    use oiroll_core::domain::{CandidateFilter, SortKey, Weighting};

    fn method(validate_days: u32, factor: u32) -> RollMethodParams {
        RollMethodParams {
            name: "test".into(),
            filter: CandidateFilter::default(),
            sort_key: SortKey::SumProfit,
            pick_count: 3,
            weighting: Weighting::Equal,
            min_trades: 0,
            validate_days,
            train_days_factor: factor,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekly_windows_start_on_mondays() {
        // 2024-01-10 is a Wednesday.
        let windows = create_windows(&method(7, 4), d(2024, 1, 10), d(2024, 1, 31));
        assert_eq!(windows[0].validate_from, d(2024, 1, 8));
        assert_eq!(windows[0].train_from, d(2023, 12, 11));
        assert!(windows.iter().all(|w| w.validate_from.weekday() == Weekday::Mon));
        assert!(windows.windows(2).all(|p| p[0].validate_to == p[1].validate_from));
        assert_eq!(windows.len(), 4);
    }

    #[test]
    fn only_the_last_window_can_be_final() {
        let windows = create_windows(&method(7, 2), d(2024, 1, 8), d(2024, 1, 24));
        assert_eq!(windows.len(), 3);
        assert!(!windows[0].is_final);
        assert!(!windows[1].is_final);
        assert!(windows[2].is_final);

        // A range ending on Sunday completes its last week.
        let complete = create_windows(&method(7, 2), d(2024, 1, 8), d(2024, 1, 21));
        assert!(complete.iter().all(|w| !w.is_final));
    }

    #[test]
    fn fortnightly_stride() {
        let windows = create_windows(&method(14, 2), d(2024, 1, 10), d(2024, 2, 10));
        assert_eq!(windows[0].validate_from, d(2024, 1, 8));
        assert_eq!(windows[1].validate_from, d(2024, 1, 22));
        assert_eq!(windows[0].train_from, d(2023, 12, 11));
    }

    #[test]
    fn monthly_windows_follow_the_calendar() {
        let windows = create_windows(&method(30, 3), d(2024, 1, 15), d(2024, 3, 31));
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].validate_from, d(2024, 1, 1));
        assert_eq!(windows[0].train_from, d(2023, 10, 1));
        assert_eq!(windows[1].validate_from, d(2024, 2, 1));
        assert_eq!(windows[1].validate_to, d(2024, 3, 1));
        assert!(!windows[2].is_final);
    }

    #[test]
    fn raw_alignment_for_other_lengths() {
        let windows = create_windows(&method(5, 2), d(2024, 1, 10), d(2024, 1, 20));
        assert_eq!(windows[0].validate_from, d(2024, 1, 10));
        assert_eq!(windows[0].train_from, d(2023, 12, 31));
        assert_eq!(windows[1].validate_from, d(2024, 1, 15));
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(create_windows(&method(7, 1), d(2024, 2, 1), d(2024, 1, 1)).is_empty());
    }
}

//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Rank round-trip — a rank clip recovers the sample's linear quantiles
//! 2. Monotone clips — every family yields a non-decreasing grid
//! 3. Determinism — the state machine is a pure function of its inputs
//! 4. Zero-sum — opens equal closes, or the aggregator flags the stream

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use oiroll_core::calendar::SessionCalendar;
use oiroll_core::domain::{
    NormMethod, PositionRecord, PriceSeries, PriceTick, RatioTick, TradeArgsId, TriggerRow,
    TriggerTable, Zone,
};
use oiroll_core::normalize::{build_curve, grid, quantile};
use oiroll_core::profit::{count_transitions, extract_trades};
use oiroll_core::signal::SignalMachine;
use oiroll_core::CoreError;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_method() -> impl Strategy<Value = NormMethod> {
    prop_oneof![
        (0u32..40).prop_map(NormMethod::min_max),
        Just(NormMethod::rank()),
        (0u32..5).prop_map(NormMethod::z_score),
    ]
}

fn arb_samples() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-50.0..50.0_f64, 1..120)
}

fn session_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

fn triggers() -> TriggerTable {
    let rows = SessionCalendar::default()
        .session_minutes()
        .into_iter()
        .map(|time| TriggerRow {
            time,
            long_open: Some(-0.3),
            long_close: Some(-0.1),
            short_open: Some(0.3),
            short_close: Some(0.1),
        })
        .collect();
    TriggerTable::from_rows(rows)
}

fn day_ticks(values: &[f64]) -> Vec<RatioTick> {
    SessionCalendar::default()
        .session_minutes()
        .into_iter()
        .zip(values.iter().chain(std::iter::repeat(&0.0)))
        .map(|(time, v)| RatioTick {
            dt: session_day().and_time(time),
            ratio: 1.0 + v,
            ratio_diff: *v,
        })
        .collect()
}

fn minute(i: usize) -> NaiveDateTime {
    session_day().and_hms_opt(9, 30, 0).unwrap() + chrono::Duration::minutes(i as i64)
}

// ── 1. Rank Round-Trip ───────────────────────────────────────────────

proptest! {
    /// With distinct samples, rank normalization inverts to linear quantiles.
    #[test]
    fn rank_clip_recovers_quantiles(
        set in prop::collection::btree_set(-10_000i32..10_000, 2..200),
    ) {
        let raw: Vec<f64> = set.iter().rev().map(|v| *v as f64 / 7.0).collect();
        let mut sorted = raw.clone();
        sorted.sort_by(f64::total_cmp);

        let curve = build_curve(NormMethod::rank(), &raw).unwrap();
        for (g, v) in grid().iter().zip(&curve) {
            prop_assert!((v - quantile(&sorted, *g)).abs() < 1e-9);
        }
    }
}

// ── 2. Monotone Clips ────────────────────────────────────────────────

proptest! {
    /// Every clip is non-decreasing and stays inside the sample range.
    #[test]
    fn clip_curves_are_monotone(method in arb_method(), raw in arb_samples()) {
        let curve = build_curve(method, &raw).unwrap();
        prop_assert_eq!(curve.len(), grid().len());
        prop_assert!(curve.windows(2).all(|w| w[0] <= w[1]));

        let lo = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(curve.iter().all(|v| *v >= lo - 1e-9 && *v <= hi + 1e-9));
    }
}

// ── 3. Determinism ───────────────────────────────────────────────────

proptest! {
    /// Same ticks, same triggers → same records; positions stay in {-1, 0, 1}
    /// and the session ends flat.
    #[test]
    fn state_machine_is_deterministic(
        values in prop::collection::vec(-0.6..0.6_f64, 242),
        noon_close in any::<bool>(),
    ) {
        let cal = SessionCalendar::default();
        let machine = SignalMachine::new(&cal);
        let ticks = day_ticks(&values);
        let table = triggers();

        let a = machine.run_day(TradeArgsId(1), noon_close, &ticks, &table).unwrap();
        let b = machine.run_day(TradeArgsId(1), noon_close, &ticks, &table).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), ticks.len());
        prop_assert!(a.iter().all(|r| (-1..=1).contains(&r.position)));
        prop_assert_eq!(a.last().map(|r| r.position), Some(0));
    }
}

// ── 4. Zero-Sum ──────────────────────────────────────────────────────

proptest! {
    /// Full sessions always pair every open with a close.
    #[test]
    fn full_sessions_balance(values in prop::collection::vec(-0.6..0.6_f64, 242)) {
        let cal = SessionCalendar::default();
        let ticks = day_ticks(&values);
        let records = SignalMachine::new(&cal)
            .run_day(TradeArgsId(1), false, &ticks, &triggers())
            .unwrap();
        let prices = PriceSeries::new(
            ticks.iter().map(|t| PriceTick { dt: t.dt, price: 3.0 + t.ratio_diff }).collect(),
        );

        let (opens, closes) = count_transitions(&records);
        prop_assert_eq!(opens, closes);
        let trades = extract_trades(&records, &prices, 0.0).unwrap();
        prop_assert_eq!(trades.len(), closes);
    }

    /// A truncated stream that ends in a position is flagged, never paired.
    #[test]
    fn unbalanced_streams_are_flagged(positions in prop::collection::vec(-1i8..=1, 1..60)) {
        let records: Vec<PositionRecord> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| PositionRecord {
                trade_args_id: TradeArgsId(1),
                dt: minute(i),
                zone: Zone::hold_for(*p),
                position: *p,
            })
            .collect();
        let prices = PriceSeries::new(
            (0..positions.len()).map(|i| PriceTick { dt: minute(i), price: 10.0 }).collect(),
        );

        let (opens, closes) = count_transitions(&records);
        let result = extract_trades(&records, &prices, 0.0);
        if opens == closes {
            prop_assert_eq!(result.unwrap().len(), closes);
        } else {
            prop_assert_eq!(opens, closes + 1);
            let is_integrity = matches!(result, Err(CoreError::SignalIntegrity { .. }));
            prop_assert!(is_integrity);
        }
    }
}

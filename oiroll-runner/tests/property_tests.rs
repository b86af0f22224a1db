//! Property tests for ranking, selection and windowing.
//!
//! 1. Weight normalization — selected weights sum to 1 (or nothing is selected)
//! 2. Tie-break — equal scores rank by ascending TradeArgs ID
//! 3. Window alignment — weekly windows start on Mondays and tile the range

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;
use std::collections::BTreeMap;

use oiroll_core::domain::{
    CandidateFilter, RollMethodParams, SortKey, TradeArgsId, Weighting,
};
use oiroll_core::profit::ProfitSummary;
use oiroll_runner::{create_windows, rank_candidates, select};

fn arb_book() -> impl Strategy<Value = BTreeMap<TradeArgsId, ProfitSummary>> {
    prop::collection::btree_map(
        (1u64..200).prop_map(TradeArgsId),
        (-5.0..5.0_f64, 0usize..6).prop_map(|(p, n)| ProfitSummary {
            sum_profit: p,
            sum_profit_percent: p / 100.0,
            sum_logret: (p / 100.0).ln_1p(),
            count: n,
        }),
        0..40,
    )
}

fn arb_sort_key() -> impl Strategy<Value = SortKey> {
    prop_oneof![
        Just(SortKey::SumProfit),
        Just(SortKey::Compound),
        Just(SortKey::Count),
        Just(SortKey::MeanProfit),
    ]
}

fn arb_weighting() -> impl Strategy<Value = Weighting> {
    prop_oneof![Just(Weighting::Equal), Just(Weighting::Proportional)]
}

proptest! {
    #[test]
    fn selected_weights_sum_to_one(
        book in arb_book(),
        key in arb_sort_key(),
        weighting in arb_weighting(),
        pick in 1usize..15,
        min_trades in 0usize..3,
    ) {
        let ranked = rank_candidates(&book, key, min_trades);
        let picks = select(&ranked, pick, weighting);
        prop_assert!(picks.len() <= pick);
        if picks.is_empty() {
            prop_assert!(ranked.is_empty());
        } else {
            let sum: f64 = picks.iter().map(|p| p.weight).sum();
            prop_assert!((sum - 1.0).abs() < 1e-9, "sum = {}", sum);
            prop_assert!(picks.iter().all(|p| p.weight >= 0.0));
        }
    }

    #[test]
    fn ranking_is_total_and_tie_broken_by_id(book in arb_book(), key in arb_sort_key()) {
        let ranked = rank_candidates(&book, key, 0);
        for (i, r) in ranked.iter().enumerate() {
            prop_assert_eq!(r.rank as usize, i + 1);
        }
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                prop_assert!(pair[0].trade_args_id < pair[1].trade_args_id);
            }
        }
    }

    #[test]
    fn weekly_windows_tile_from_monday(offset in 0i64..400, weeks in 0i64..20, factor in 1u32..6) {
        let from = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(offset);
        let to = from + Duration::days(weeks * 7);
        let method = RollMethodParams {
            name: "weekly".into(),
            filter: CandidateFilter::default(),
            sort_key: SortKey::SumProfit,
            pick_count: 1,
            weighting: Weighting::Equal,
            min_trades: 0,
            validate_days: 7,
            train_days_factor: factor,
        };
        let windows = create_windows(&method, from, to);
        prop_assert!(!windows.is_empty());
        prop_assert!(windows[0].validate_from <= from);
        for w in &windows {
            prop_assert_eq!(w.validate_from.weekday(), Weekday::Mon);
            prop_assert_eq!((w.train_to - w.train_from).num_days(), 7 * factor as i64);
            prop_assert!(w.validate_from <= to);
        }
        for pair in windows.windows(2) {
            prop_assert_eq!(pair[0].validate_to, pair[1].validate_from);
            prop_assert!(!pair[0].is_final);
        }
    }
}

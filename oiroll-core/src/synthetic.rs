//! Deterministic synthetic market data for demos and tests.
//!
//! One ratio tick and one spot price per session minute on every weekday in
//! the range. The seed is derived from the label with BLAKE3, so the same
//! label always yields the same series.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::calendar::SessionCalendar;
use crate::domain::{PriceSeries, PriceTick, RatioSeries};

/// A generated ratio series and the spot prices that go with it.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    pub ratio: RatioSeries,
    pub prices: PriceSeries,
}

/// Generate `[start, end]` inclusive.
///
/// The intraday ratio is a mean-reverting walk; price returns lean against
/// the ratio's moves so threshold strategies have something to find.
pub fn generate(label: &str, start: NaiveDate, end: NaiveDate, calendar: &SessionCalendar) -> SyntheticMarket {
    let seed: [u8; 32] = *blake3::hash(label.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let minutes = calendar.session_minutes();
    let mut ratio_points = Vec::new();
    let mut price_ticks = Vec::new();
    let mut price = 2.0_f64;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += Duration::days(1);
            continue;
        }

        let open_ratio: f64 = rng.gen_range(0.8..1.2);
        let mut ratio = open_ratio;
        for &time in &minutes {
            let shock: f64 = rng.gen_range(-0.01..0.01);
            let step = shock - 0.05 * (ratio - open_ratio);
            ratio = (ratio + step).max(0.05);
            let noise: f64 = rng.gen_range(-0.0004..0.0004);
            price *= 1.0 - 0.05 * step + noise;

            let dt = current.and_time(time);
            ratio_points.push((dt, ratio));
            price_ticks.push(PriceTick { dt, price });
        }
        current += Duration::days(1);
    }

    SyntheticMarket {
        ratio: RatioSeries::from_ratios(ratio_points),
        prices: PriceSeries::new(price_ticks),
    }
}

//! Backtest driver — every `(TradeArgs, trading day)` unit over a range.
//!
//! Units are independent and fan out over the rayon pool. They share the
//! read-only series, the store and one clip cache. A unit's failure becomes a
//! `UnitError` in the report; only cross-cutting failures (unknown dataset,
//! empty TradeArgs universe) abort the run.

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use oiroll_core::calendar::week_monday;
use oiroll_core::domain::{DatasetId, PriceSeries, TradeArgs, TradeArgsId};
use oiroll_core::normalize::ClipCache;
use oiroll_core::profit::extract_trades;
use oiroll_core::signal::{ClipResolver, SignalMachine};
use oiroll_core::store::{DayOutput, Store};
use oiroll_core::CoreError;

use crate::config::RunConfig;
use crate::report::{BatchReport, UnitError};

/// What one backtest run covers. `from..=to` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktestRequest {
    pub dataset_id: DatasetId,
    pub trade_args_from: TradeArgsId,
    pub trade_args_to: TradeArgsId,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

enum UnitOutcome {
    Computed { trades: usize },
    Skipped,
    Failed(UnitError),
}

/// Runs the state machine and profit aggregator for every unit of a request.
pub struct Backtester<'a> {
    store: &'a dyn Store,
    config: &'a RunConfig,
}

impl<'a> Backtester<'a> {
    pub fn new(store: &'a dyn Store, config: &'a RunConfig) -> Self {
        Self { store, config }
    }

    pub fn run(&self, request: &BacktestRequest) -> Result<BatchReport, CoreError> {
        if request.from > request.to {
            return Err(CoreError::Config(format!(
                "backtest range is empty: {} > {}",
                request.from, request.to
            )));
        }
        let dataset = self.store.dataset(request.dataset_id)?;
        let universe = self
            .store
            .trade_args_range(request.trade_args_from, request.trade_args_to)?;
        if universe.is_empty() {
            return Err(CoreError::no_data(format!(
                "no trade args in [{}, {}]",
                request.trade_args_from, request.trade_args_to
            )));
        }

        let end = day_after(request.to);
        let max_train = universe.iter().map(|ta| ta.params.train_days).max().unwrap_or(0);
        let history_from = week_monday(request.from) - Duration::days(max_train as i64);
        let series = self.store.ratio_series(dataset.id, history_from, end)?;
        let prices = self.store.price_series(&dataset.spotcode, request.from, end)?;

        // Clips are rebuilt from the current series on every run; stored
        // tables are never read back.
        let cache = ClipCache::new();

        let days: Vec<NaiveDate> = series
            .dates()
            .into_iter()
            .filter(|d| *d >= request.from && *d <= request.to)
            .collect();
        let units: Vec<(TradeArgs, NaiveDate)> = universe
            .iter()
            .flat_map(|ta| days.iter().map(move |d| (*ta, *d)))
            .collect();
        info!(
            dataset = %dataset.id,
            trade_args = universe.len(),
            days = days.len(),
            units = units.len(),
            "starting backtest"
        );

        let resolver = ClipResolver::new(dataset.id, &series, &cache, &self.config.calendar);
        let unit = |(ta, date): &(TradeArgs, NaiveDate)| {
            self.run_unit(&resolver, &prices, ta, *date)
        };
        let outcomes: Vec<UnitOutcome> = if self.config.backtest.parallel {
            units.par_iter().map(unit).collect()
        } else {
            units.iter().map(unit).collect()
        };

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Computed { trades } => {
                    report.succeeded += 1;
                    report.trades += trades;
                }
                UnitOutcome::Skipped => report.skipped += 1,
                UnitOutcome::Failed(err) => {
                    warn!(trade_args = %err.trade_args_id, date = %err.date, error = %err.message, "unit failed");
                    report.failures.push(err);
                }
            }
        }
        report.sort_failures();

        if cache.builds() > 0 {
            self.store.upsert_clips(&cache.snapshot())?;
            debug!(built = cache.builds(), cached = cache.len(), "persisted clip tables");
        }
        info!(%report, "backtest finished");
        Ok(report)
    }

    fn run_unit(
        &self,
        resolver: &ClipResolver<'_>,
        prices: &PriceSeries,
        trade_args: &TradeArgs,
        date: NaiveDate,
    ) -> UnitOutcome {
        let id = trade_args.id;
        match self.compute_unit(resolver, prices, trade_args, date) {
            Ok(Some(trades)) => UnitOutcome::Computed { trades },
            Ok(None) => UnitOutcome::Skipped,
            Err(e) => UnitOutcome::Failed(UnitError::new(id, date, &e)),
        }
    }

    fn compute_unit(
        &self,
        resolver: &ClipResolver<'_>,
        prices: &PriceSeries,
        trade_args: &TradeArgs,
        date: NaiveDate,
    ) -> Result<Option<usize>, CoreError> {
        if !self.config.backtest.force && self.store.has_day_output(trade_args.id, date)? {
            return Ok(None);
        }
        let params = &trade_args.params;
        let table = resolver.trigger_table(params, date)?;
        let ticks = resolver.series().day(date);
        let positions = SignalMachine::new(&self.config.calendar).run_day(
            trade_args.id,
            params.noon_close,
            ticks,
            &table,
        )?;
        let trades = extract_trades(&positions, prices, self.config.backtest.fee_rate)?;
        let count = trades.len();
        self.store.upsert_day_output(DayOutput {
            trade_args_id: trade_args.id,
            date,
            positions,
            trades,
        })?;
        Ok(Some(count))
    }
}

/// The calendar day after `date` (saturating at the last representable day).
pub fn day_after(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oiroll_core::calendar::SessionCalendar;
    use oiroll_core::domain::{NormMethod, RatioTick, TradeArgsParams, THRESHOLD_OFF};
    use oiroll_core::store::MemoryStore;
    use oiroll_core::synthetic;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn params() -> TradeArgsParams {
        TradeArgsParams {
            method: NormMethod::rank(),
            train_days: 14,
            zero_threshold: 0.5,
            long_open: -0.35,
            long_close: -0.1,
            short_open: THRESHOLD_OFF,
            short_close: THRESHOLD_OFF,
            noon_close: false,
        }
    }

    #[test]
    fn backfilled_history_rebuilds_clips() {
        let calendar = SessionCalendar::default();
        let market = synthetic::generate("159915", d(1), d(19), &calendar);
        let (late, early): (Vec<RatioTick>, Vec<RatioTick>) =
            market.ratio.ticks().iter().cloned().partition(|t| t.dt.date() >= d(8));

        let store = MemoryStore::new();
        let ds = store.insert_dataset("159915", 1, "atm").unwrap();
        store.upsert_ratio_ticks(ds, &late).unwrap();
        store.upsert_prices("159915", market.prices.ticks()).unwrap();
        let id = store.insert_trade_args(&params()).unwrap();

        let mut config = RunConfig::default();
        config.backtest.parallel = false;
        config.backtest.force = true;
        let request = BacktestRequest {
            dataset_id: ds,
            trade_args_from: id,
            trade_args_to: id,
            from: d(15),
            to: d(15),
        };
        // Only half of the [01-01, 01-15) training window is known.
        let backtester = Backtester::new(&store, &config);
        backtester.run(&request).unwrap();
        let before = store.clips(ds).unwrap();
        assert!(!before.is_empty());

        store.upsert_ratio_ticks(ds, &early).unwrap();
        backtester.run(&request).unwrap();
        let after = store.clips(ds).unwrap();
        assert_ne!(after, before, "clips must follow the backfilled history");

        let series = store.ratio_series(ds, d(1), d(16)).unwrap();
        let fresh = ClipCache::new();
        ClipResolver::new(ds, &series, &fresh, &calendar)
            .trigger_table(&params(), d(15))
            .unwrap();
        assert_eq!(after, fresh.snapshot());
    }
}

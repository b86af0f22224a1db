//! OIRoll CLI — drive the pipeline over a JSON store snapshot.
//!
//! Commands:
//! - `demo` — seed a synthetic dataset, the default TradeArgs grid and a weekly roll
//! - `import` — load ratio and price CSV files into a dataset
//! - `backtest` — run every (TradeArgs, day) unit over a date range
//! - `roll` — walk-forward selection for a roll args
//! - `merge` — blend the top selections into one position stream
//! - `export` — freeze one week's selection into a portable JSON document
//! - `replay` — reproduce positions from an export document

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use oiroll_core::calendar::{last_friday_before, week_monday};
use oiroll_core::domain::{
    CandidateFilter, DatasetId, RollArgsId, RollArgsParams, RollMerged, RollMethodParams, SortKey,
    TradeArgsId, Weighting,
};
use oiroll_core::profit::count_transitions;
use oiroll_core::store::{MemoryStore, Store};
use oiroll_core::synthetic;
use oiroll_runner::config::LoggingSection;
use oiroll_runner::merge::run_length_compress;
use oiroll_runner::{
    data_io, day_after, export, BacktestRequest, Backtester, EnsembleMerger, RollOptimizer,
    RunConfig, TradeArgsGrid,
};

#[derive(Parser)]
#[command(
    name = "oiroll",
    about = "OIRoll CLI — open-interest ratio walk-forward ensemble"
)]
struct Cli {
    /// Store snapshot file. Created on first write.
    #[arg(long, global = true, default_value = "oiroll-store.json")]
    store: PathBuf,

    /// Run configuration (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "oiroll.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a synthetic dataset, the default grid and a weekly roll method.
    Demo {
        /// Spot code of the synthetic dataset.
        #[arg(long, default_value = "159915")]
        spotcode: String,

        /// Number of weeks to roll over.
        #[arg(long, default_value_t = 8)]
        weeks: i64,

        /// Last trading day. Defaults to the last Friday before today.
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Import ratio and price CSV files.
    Import {
        #[arg(long)]
        spotcode: String,

        #[arg(long, default_value_t = 1)]
        expiry_priority: u8,

        #[arg(long, default_value = "atm")]
        strike: String,

        /// Ratio CSV: dt,ratio[,ratio_diff]
        #[arg(long)]
        ratio: Option<PathBuf>,

        /// Price CSV: dt,price
        #[arg(long)]
        prices: Option<PathBuf>,
    },
    /// Backtest a TradeArgs ID range over a date range (inclusive).
    Backtest {
        #[arg(long)]
        dataset: u64,

        #[arg(long)]
        trade_args_from: u64,

        #[arg(long)]
        trade_args_to: u64,

        #[arg(long)]
        from: NaiveDate,

        /// Defaults to the last Friday before today.
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Recompute units that already have output.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Run units on the calling thread only.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Run the walk-forward roll optimizer.
    Roll {
        #[arg(long)]
        roll_args: u64,

        #[arg(long)]
        from: NaiveDate,

        /// Defaults to the last Friday before today.
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Merge the top selections into one position stream.
    Merge {
        #[arg(long)]
        roll_args: u64,

        #[arg(long, default_value_t = 10)]
        top: u32,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: Option<NaiveDate>,

        /// Also write the merged change points as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Export one ISO week's selection as a JSON document.
    Export {
        #[arg(long)]
        roll_args: u64,

        #[arg(long, default_value_t = 10)]
        top: u32,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// Output file. Defaults to `export-<id>.json`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replay an export document against the stored ratio series.
    Replay {
        /// Export document to replay.
        #[arg(long)]
        export: PathBuf,

        /// Write the blended change points as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RunConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.logging);

    let store = MemoryStore::load(&cli.store)
        .with_context(|| format!("failed to load store {}", cli.store.display()))?;

    match cli.command {
        Commands::Demo { spotcode, weeks, to } => run_demo(&store, &config, &spotcode, weeks, to)?,
        Commands::Import {
            spotcode,
            expiry_priority,
            strike,
            ratio,
            prices,
        } => run_import(&store, &spotcode, expiry_priority, &strike, ratio, prices)?,
        Commands::Backtest {
            dataset,
            trade_args_from,
            trade_args_to,
            from,
            to,
            force,
            sequential,
        } => {
            let mut config = config;
            config.backtest.force |= force;
            config.backtest.parallel &= !sequential;
            let request = BacktestRequest {
                dataset_id: DatasetId(dataset),
                trade_args_from: TradeArgsId(trade_args_from),
                trade_args_to: TradeArgsId(trade_args_to),
                from,
                to: to.unwrap_or_else(default_end),
            };
            run_backtest(&store, &config, &request)?;
        }
        Commands::Roll { roll_args, from, to } => {
            let to = to.unwrap_or_else(default_end);
            let summary = RollOptimizer::new(&store).optimize(RollArgsId(roll_args), from, to)?;
            println!(
                "roll args {roll_args}: {} windows, {} skipped, {} rows",
                summary.windows, summary.windows_skipped, summary.rows
            );
        }
        Commands::Merge {
            roll_args,
            top,
            from,
            to,
            csv,
        } => {
            let to = to.unwrap_or_else(default_end);
            let id = RollArgsId(roll_args);
            let summary = EnsembleMerger::new(&store, config.merge.weight_tolerance)
                .merge(id, top, from, to)?;
            println!(
                "roll args {roll_args} top {top}: {} windows, {} rows, {} timestamps dropped, {} overweight windows",
                summary.windows, summary.rows, summary.dropped, summary.overweight_windows
            );
            if let Some(path) = csv {
                let rows = store.roll_merged(id, top, from, day_after(to))?;
                write_csv(&path, &data_io::export_merged_csv(&rows)?)?;
            }
        }
        Commands::Export {
            roll_args,
            top,
            from,
            to,
            out,
        } => {
            let doc = export::export(&store, &config.calendar, RollArgsId(roll_args), top, from, to)?;
            let path = out.unwrap_or_else(|| PathBuf::from(format!("export-{}.json", doc.export_id)));
            export::write_file(&doc, &path)?;
            println!(
                "exported {} trade args for {}..={} to {}",
                doc.trade_args.len(),
                doc.input_dt_from,
                doc.input_dt_to,
                path.display()
            );
        }
        Commands::Replay { export: path, csv } => {
            run_replay(&store, &config, &path, csv)?;
            // Replay never writes to the store.
            return Ok(());
        }
    }

    store
        .save(&cli.store)
        .with_context(|| format!("failed to save store {}", cli.store.display()))?;
    Ok(())
}

fn init_tracing(logging: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn default_end() -> NaiveDate {
    last_friday_before(Local::now().date_naive())
}

fn run_demo(
    store: &MemoryStore,
    config: &RunConfig,
    spotcode: &str,
    weeks: i64,
    to: Option<NaiveDate>,
) -> Result<()> {
    if weeks <= 0 {
        bail!("--weeks must be positive");
    }
    let to = to.unwrap_or_else(default_end);
    let grid = TradeArgsGrid::default();
    let method = RollMethodParams {
        name: "weekly-sum-top10".into(),
        filter: CandidateFilter::default(),
        sort_key: SortKey::SumProfit,
        pick_count: 10,
        weighting: Weighting::Equal,
        min_trades: 1,
        validate_days: 7,
        train_days_factor: 4,
    };

    // Enough history for the first roll window's training period plus the
    // clip window of its earliest trading day.
    let roll_from = week_monday(to) - Duration::weeks(weeks - 1);
    let max_clip = grid.train_days.iter().copied().max().unwrap_or(0) as i64;
    let backtest_from = roll_from - Duration::days(method.train_days() as i64);
    let data_from = backtest_from - Duration::days(max_clip);

    let market = synthetic::generate(spotcode, data_from, to, &config.calendar);
    let dataset = store.insert_dataset(spotcode, 1, "atm")?;
    store.upsert_ratio_ticks(dataset, market.ratio.ticks())?;
    store.upsert_prices(spotcode, market.prices.ticks())?;
    let (lo, hi) = grid.insert_into(store)?;
    let method_id = store.insert_roll_method(&method)?;
    let roll_args = store.insert_roll_args(&RollArgsParams {
        dataset_id: dataset,
        roll_method_id: method_id,
        trade_args_from_id: lo,
        trade_args_to_id: hi,
    })?;
    info!(%dataset, ticks = market.ratio.len(), "seeded synthetic market");

    println!("dataset {dataset} ({spotcode}): {} ratio ticks {data_from}..={to}", market.ratio.len());
    println!("trade args {lo}..={hi}");
    println!("roll method {method_id} ({}), roll args {roll_args}", method.name);
    println!();
    println!("next:");
    println!(
        "  oiroll backtest --dataset {dataset} --trade-args-from {lo} --trade-args-to {hi} --from {backtest_from} --to {to}"
    );
    println!("  oiroll roll --roll-args {roll_args} --from {roll_from} --to {to}");
    println!("  oiroll merge --roll-args {roll_args} --from {roll_from} --to {to}");
    Ok(())
}

fn run_import(
    store: &MemoryStore,
    spotcode: &str,
    expiry_priority: u8,
    strike: &str,
    ratio: Option<PathBuf>,
    prices: Option<PathBuf>,
) -> Result<()> {
    if ratio.is_none() && prices.is_none() {
        bail!("nothing to import: pass --ratio and/or --prices");
    }
    let dataset = store.insert_dataset(spotcode, expiry_priority, strike)?;
    if let Some(path) = ratio {
        let series = data_io::load_ratio_file(&path)?;
        let n = store.upsert_ratio_ticks(dataset, series.ticks())?;
        println!("dataset {dataset}: {n} ratio ticks from {}", path.display());
    }
    if let Some(path) = prices {
        let ticks = data_io::load_price_file(&path)?;
        let n = store.upsert_prices(spotcode, &ticks)?;
        println!("{spotcode}: {n} prices from {}", path.display());
    }
    Ok(())
}

fn run_backtest(store: &MemoryStore, config: &RunConfig, request: &BacktestRequest) -> Result<()> {
    let report = Backtester::new(store, config).run(request)?;
    println!("{report}");
    if !report.failures.is_empty() {
        println!();
        println!("failed units:");
        for failure in &report.failures {
            let class = if failure.data_absence { "no data" } else { "integrity" };
            println!("  [{class}] {failure}");
        }
    }
    Ok(())
}

fn run_replay(
    store: &MemoryStore,
    config: &RunConfig,
    path: &Path,
    csv: Option<PathBuf>,
) -> Result<()> {
    let doc = export::read_file(path)?;
    let series = store.ratio_series(doc.dataset_id, doc.input_dt_from, day_after(doc.input_dt_to))?;
    if series.is_empty() {
        bail!(
            "dataset {} has no ratio ticks for {}..={}",
            doc.dataset_id,
            doc.input_dt_from,
            doc.input_dt_to
        );
    }
    let out = export::replay(&doc, &series, &config.calendar)?;

    println!("export {} ({} ticks)", doc.export_id, series.len());
    for (id, records) in &out.positions {
        let (opens, closes) = count_transitions(records);
        let weight = doc.trade_args.get(id).copied().unwrap_or(0.0);
        println!("  trade args {id} (weight {weight:.4}): {opens} opens, {closes} closes");
    }

    let changes = run_length_compress(&out.blended);
    println!("blended: {} change points", changes.len());
    if let Some(csv_path) = csv {
        let rows: Vec<RollMerged> = changes
            .into_iter()
            .map(|(dt, position)| RollMerged {
                roll_args_id: doc.roll_args_id,
                top: doc.roll_top,
                dt,
                position,
            })
            .collect();
        write_csv(&csv_path, &data_io::export_merged_csv(&rows)?)?;
    }
    Ok(())
}

fn write_csv(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

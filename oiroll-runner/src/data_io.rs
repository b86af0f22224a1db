//! CSV import of market series and CSV export of merged positions.
//!
//! Input files have a header row. Timestamps are local exchange time in
//! `%Y-%m-%d %H:%M:%S` (a `T` separator is accepted as well).
//! - ratio files: `dt,ratio` or `dt,ratio,ratio_diff`; without a
//!   `ratio_diff` column it is derived from each day's first ratio
//! - price files: `dt,price`

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;

use oiroll_core::domain::{PriceTick, RatioSeries, RatioTick, RollMerged};

const DT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DT_OUT: &str = "%Y-%m-%d %H:%M:%S";

// ─── Import ─────────────────────────────────────────────────────────

pub fn read_ratio_csv<R: Read>(reader: R) -> Result<RatioSeries> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("failed to read ratio CSV header")?.clone();
    let dt_col = column(&headers, "dt")?;
    let ratio_col = column(&headers, "ratio")?;
    let diff_col = headers.iter().position(|h| h.trim() == "ratio_diff");

    let mut points = Vec::new();
    let mut ticks = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("ratio CSV row {}", line + 2))?;
        let dt = parse_dt(field(&record, dt_col, "dt")?)?;
        let ratio = parse_f64(field(&record, ratio_col, "ratio")?, "ratio")?;
        match diff_col {
            Some(col) => {
                let ratio_diff = parse_f64(field(&record, col, "ratio_diff")?, "ratio_diff")?;
                ticks.push(RatioTick { dt, ratio, ratio_diff });
            }
            None => points.push((dt, ratio)),
        }
    }
    Ok(match diff_col {
        Some(_) => RatioSeries::new(ticks),
        None => RatioSeries::from_ratios(points),
    })
}

pub fn read_price_csv<R: Read>(reader: R) -> Result<Vec<PriceTick>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("failed to read price CSV header")?.clone();
    let dt_col = column(&headers, "dt")?;
    let price_col = column(&headers, "price")?;

    let mut ticks = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("price CSV row {}", line + 2))?;
        let dt = parse_dt(field(&record, dt_col, "dt")?)?;
        let price = parse_f64(field(&record, price_col, "price")?, "price")?;
        if !(price.is_finite() && price > 0.0) {
            bail!("price at {dt} must be positive, got {price}");
        }
        ticks.push(PriceTick { dt, price });
    }
    ticks.sort_by_key(|t| t.dt);
    Ok(ticks)
}

pub fn load_ratio_file(path: &Path) -> Result<RatioSeries> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_ratio_csv(file).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn load_price_file(path: &Path) -> Result<Vec<PriceTick>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_price_csv(file).with_context(|| format!("failed to parse {}", path.display()))
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| format!("missing `{name}` column"))
}

fn field<'r>(record: &'r csv::StringRecord, col: usize, name: &str) -> Result<&'r str> {
    record
        .get(col)
        .map(str::trim)
        .with_context(|| format!("missing `{name}` value"))
}

fn parse_dt(s: &str) -> Result<NaiveDateTime> {
    DT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .with_context(|| format!("invalid timestamp `{s}`"))
}

fn parse_f64(s: &str, name: &str) -> Result<f64> {
    s.parse::<f64>()
        .with_context(|| format!("invalid {name} value `{s}`"))
}

// ─── Export ─────────────────────────────────────────────────────────

/// Merged position change points as CSV.
///
/// Columns: roll_args_id, top, dt, position
pub fn export_merged_csv(rows: &[RollMerged]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["roll_args_id", "top", "dt", "position"])?;
    for row in rows {
        wtr.write_record([
            &row.roll_args_id.to_string(),
            &row.top.to_string(),
            &row.dt.format(DT_OUT).to_string(),
            &format!("{:.9}", row.position),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use oiroll_core::domain::RollArgsId;

    #[test]
    fn ratio_diff_derived_per_day() {
        let csv = "dt,ratio\n\
                   2024-01-08 09:31:00,1.00\n\
                   2024-01-08 09:32:00,1.25\n\
                   2024-01-09T09:31:00,2.00\n";
        let series = read_ratio_csv(csv.as_bytes()).unwrap();
        assert_eq!(series.len(), 3);
        assert!((series.ticks()[1].ratio_diff - 0.25).abs() < 1e-12);
        assert_eq!(series.ticks()[2].ratio_diff, 0.0);
    }

    #[test]
    fn explicit_ratio_diff_is_kept() {
        let csv = "dt,ratio,ratio_diff\n2024-01-08 09:31:00,1.0,-0.3\n";
        let series = read_ratio_csv(csv.as_bytes()).unwrap();
        assert_eq!(series.ticks()[0].ratio_diff, -0.3);
    }

    #[test]
    fn bad_rows_are_reported() {
        assert!(read_ratio_csv("dt,ratio\nyesterday,1.0\n".as_bytes()).is_err());
        assert!(read_ratio_csv("time,ratio\n2024-01-08 09:31:00,1.0\n".as_bytes()).is_err());
        assert!(read_price_csv("dt,price\n2024-01-08 09:31:00,0\n".as_bytes()).is_err());
    }

    #[test]
    fn prices_are_sorted() {
        let csv = "dt,price\n2024-01-08 09:32:00,2.5\n2024-01-08 09:31:00,2.4\n";
        let ticks = read_price_csv(csv.as_bytes()).unwrap();
        assert!(ticks[0].dt < ticks[1].dt);
    }

    #[test]
    fn merged_csv_columns() {
        let rows = [RollMerged {
            roll_args_id: RollArgsId(2),
            top: 10,
            dt: NaiveDate::from_ymd_opt(2024, 1, 8)
                .unwrap()
                .and_hms_opt(9, 31, 0)
                .unwrap(),
            position: 0.5,
        }];
        let csv = export_merged_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "roll_args_id,top,dt,position");
        assert_eq!(lines[1], "2,10,2024-01-08 09:31:00,0.500000000");
    }
}

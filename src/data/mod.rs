//! Price history loading
//!
//! Reads OHLCV history from CSV files and writes feature matrices back out.
//! Also provides a deterministic synthetic series for demos and tests.


use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;
use crate::types::{Bar, RawSeries};

/// Header names accepted for the date column (case-insensitive)
const DATE_COLUMNS: [&str; 3] = ["date", "timestamp", "datetime"];

/// Load a CSV file with a date column and numeric price/volume columns
pub fn load_csv(path: impl AsRef<Path>, symbol: &str) -> Result<RawSeries> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let series = read_csv(file, symbol)?;
    tracing::info!(
        "Loaded {} rows for {} from {}",
        series.len(),
        symbol,
        path.display()
    );
    Ok(series)
}

/// Parse CSV from any reader.
///
/// Only the first ten characters of the date field are read, so both
/// `2024-01-31` and `2024-01-31 00:00:00` work. Rows are sorted by date.
/// Columns that do not parse as numbers are skipped; empty numeric cells
/// become `NaN`.
pub fn read_csv<R: Read>(reader: R, symbol: &str) -> Result<RawSeries> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let date_idx = headers
        .iter()
        .position(|h| DATE_COLUMNS.iter().any(|d| h.eq_ignore_ascii_case(d)))
        .ok_or_else(|| ForecastError::Validation("CSV has no date column".to_string()))?;

    let records: Vec<StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;

    let mut rows: Vec<(NaiveDate, &StringRecord)> = Vec::with_capacity(records.len());
    for record in &records {
        let raw = record.get(date_idx).unwrap_or_default();
        rows.push((parse_date(raw)?, record));
    }
    rows.sort_by_key(|(date, _)| *date);

    let mut columns = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        if idx == date_idx {
            continue;
        }
        match parse_column(&rows, idx) {
            Some(values) => columns.push((name.clone(), values)),
            None => tracing::debug!("Skipping non-numeric column '{}'", name),
        }
    }

    let dates = rows.iter().map(|(date, _)| *date).collect();
    RawSeries::new(symbol, dates, columns)
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| ForecastError::Validation(format!("invalid date '{}': {}", raw, e)))
}

fn parse_column(rows: &[(NaiveDate, &StringRecord)], idx: usize) -> Option<Vec<f64>> {
    rows.iter()
        .map(|(_, record)| match record.get(idx).unwrap_or_default() {
            "" => Some(f64::NAN),
            cell => cell.parse::<f64>().ok(),
        })
        .collect()
}

/// Write a feature matrix as CSV with a leading `date` column
pub fn write_features_csv(matrix: &FeatureMatrix, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = Writer::from_path(path)?;

    let mut header = vec!["date".to_string()];
    header.extend(matrix.feature_names().iter().cloned());
    writer.write_record(&header)?;

    for (date, row) in matrix.dates().iter().zip(matrix.rows()) {
        let mut record = vec![date.format("%Y-%m-%d").to_string()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Symbol implied by a file name: `data/aapl.csv` -> `AAPL`
pub fn symbol_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Daily bars moving linearly from `start_price` to `end_price` with a small
/// deterministic oscillation
pub fn synthetic_trend(
    symbol: &str,
    start: NaiveDate,
    days: usize,
    start_price: f64,
    end_price: f64,
) -> Result<RawSeries> {
    if days < 2 {
        return Err(ForecastError::Validation(
            "synthetic series needs at least 2 days".to_string(),
        ));
    }
    let step = (end_price - start_price) / (days - 1) as f64;

    let bars: Vec<Bar> = (0..days)
        .map(|i| {
            let t = i as f64;
            let close = start_price + step * t + (t * 0.7).sin() * 0.5;
            let open = close - (t * 1.3).cos() * 0.2;
            Bar {
                date: start + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 0.3,
                low: open.min(close) - 0.3,
                close,
                volume: 1_000_000.0 + (t * 0.4).sin().abs() * 250_000.0,
            }
        })
        .collect();

    RawSeries::from_bars(symbol, &bars)
}

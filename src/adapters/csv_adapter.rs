//! CSV bar loader for replay.
//!
//! Expected columns: `timestamp,open,high,low,close,volume` with a header row.
//! Timestamps may be RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), or epoch seconds
//! or milliseconds.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::bar::Bar;
use crate::domain::error::ScalperError;

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// All rows as bars of `timeframe` minutes, sorted oldest first.
    pub fn load_bars(&self, timeframe: u32) -> Result<Vec<Bar>, ScalperError> {
        let content = fs::read_to_string(&self.path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut bars = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| parse_error(row, format!("CSV parse error: {e}")))?;

            let raw_ts = column(&record, row, 0, "timestamp")?;
            let timestamp = parse_timestamp(raw_ts)
                .ok_or_else(|| parse_error(row, format!("invalid timestamp '{raw_ts}'")))?;

            bars.push(Bar {
                timestamp,
                open: number(&record, row, 1, "open")?,
                high: number(&record, row, 2, "high")?,
                low: number(&record, row, 3, "low")?,
                close: number(&record, row, 4, "close")?,
                volume: number(&record, row, 5, "volume")?,
                timeframe,
            });
        }

        if bars.is_empty() {
            return Err(ScalperError::NoData {
                symbol: self.path.display().to_string(),
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    let epoch: i64 = raw.parse().ok()?;
    if epoch.abs() >= EPOCH_MILLIS_CUTOFF {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    }
}

fn column<'r>(
    record: &'r csv::StringRecord,
    row: usize,
    index: usize,
    name: &str,
) -> Result<&'r str, ScalperError> {
    record
        .get(index)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| parse_error(row, format!("missing {name} column")))
}

fn number(
    record: &csv::StringRecord,
    row: usize,
    index: usize,
    name: &str,
) -> Result<f64, ScalperError> {
    let raw = column(record, row, index, name)?;
    raw.parse()
        .map_err(|e| parse_error(row, format!("invalid {name} value '{raw}': {e}")))
}

fn parse_error(row: usize, reason: String) -> ScalperError {
    ScalperError::Venue {
        reason: format!("row {}: {reason}", row + 1),
    }
}

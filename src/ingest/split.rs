//! Split a raw logger dump into individual runs
//!
//! The logger's clock restarts at every power cycle, so a new run begins
//! wherever the time column goes backwards. Short runs (parking lot
//! shuffles, bench tests) are dropped.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::{info, warn};

use crate::error::{Result, TraceError};

/// Column names written by the logger firmware, in order
pub const RELABELED_SCHEMA: [&str; 27] = [
    "yaw_deg", "roll_deg", "pitch_deg", "ax_b", "ay_b", "az_b", "ax_w", "ay_w", "vx_imu", "vy_imu",
    "x_imu", "y_imu", "lat", "lon", "xgps", "ygps", "vx_gps", "vy_gps", "x_fused", "y_fused",
    "vx_fused", "vy_fused", "sys_cal", "g_cal", "a_cal", "m_cal", "millis",
];

#[derive(Clone, Debug, PartialEq)]
pub struct SplitOptions {
    /// Exact (trimmed) name of the time column in the raw file
    pub time_column: String,
    pub min_duration_ms: i64,
    /// Replace headers with `RELABELED_SCHEMA` when the column count matches
    pub relabel: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            time_column: "time".to_string(),
            min_duration_ms: 300_000,
            relabel: true,
        }
    }
}

/// One contiguous stretch of the log between clock resets
#[derive(Clone, Debug)]
pub struct Run {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
    pub duration_ms: i64,
}

pub fn split_runs<R: Read>(reader: R, options: &SplitOptions) -> Result<Vec<Run>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let raw_headers = csv_reader.headers()?.clone();

    let time_index = raw_headers
        .iter()
        .position(|h| h == options.time_column)
        .ok_or_else(|| TraceError::SchemaMismatch {
            missing: vec![options.time_column.clone()],
        })?;

    let headers = if options.relabel {
        relabel(&raw_headers)
    } else {
        raw_headers
    };

    // (rows, first time, last time) per segment
    let mut segments: Vec<(Vec<StringRecord>, i64, i64)> = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        let record = record?;
        let time = parse_time(&record, time_index, i + 1)?;

        match segments.last_mut() {
            Some((rows, _, last)) if time >= *last => {
                rows.push(record);
                *last = time;
            }
            _ => segments.push((vec![record], time, time)),
        }
    }

    let mut runs = Vec::new();
    for (rows, first, last) in segments {
        let duration_ms = last - first;
        if duration_ms < options.min_duration_ms {
            info!(
                "Dropping {} row run ({:.2} s, shorter than {:.2} s)",
                rows.len(),
                duration_ms as f64 / 1000.0,
                options.min_duration_ms as f64 / 1000.0
            );
            continue;
        }
        runs.push(Run {
            headers: headers.clone(),
            rows,
            duration_ms,
        });
    }

    if runs.is_empty() {
        warn!(
            "No runs longer than {:.0} s found",
            options.min_duration_ms as f64 / 1000.0
        );
    }
    Ok(runs)
}

/// Write each run to `out_dir/output_{n}.csv`, numbered from 1
pub fn write_runs(runs: &[Run], out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;

    let mut paths = Vec::with_capacity(runs.len());
    for (n, run) in runs.iter().enumerate() {
        let path = out_dir.join(format!("output_{}.csv", n + 1));
        let mut writer = csv::Writer::from_writer(File::create(&path)?);
        writer.write_record(&run.headers)?;
        for row in &run.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        info!(
            "Saved: {} ({:.2} s)",
            path.display(),
            run.duration_ms as f64 / 1000.0
        );
        paths.push(path);
    }
    Ok(paths)
}

fn relabel(headers: &StringRecord) -> StringRecord {
    if headers.len() != RELABELED_SCHEMA.len() {
        warn!(
            "Label count ({}) does not match column count ({}), keeping original headers",
            RELABELED_SCHEMA.len(),
            headers.len()
        );
        return headers.clone();
    }
    StringRecord::from(RELABELED_SCHEMA.to_vec())
}

fn parse_time(record: &StringRecord, index: usize, row: usize) -> Result<i64> {
    let raw = record.get(index).unwrap_or("");
    raw.parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .map(|t| t as i64)
        .ok_or_else(|| TraceError::RowParse {
            row,
            reason: format!("time value '{}' is not a number", raw),
        })
}

//! CSV log ingestion
//!
//! Bad rows never abort an ingest: a row that fails to parse is skipped and
//! counted, pre-lock rows at (0, 0) are dropped and counted separately. Only a
//! header that lacks a required column fails the whole load.

pub mod header;
pub mod split;

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::StringRecord;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::trajectory::{AppendOutcome, Trajectory};
use crate::types::{BodyAccel, BodyVelocity, GeoPoint, Sample, WorldAccel};

pub use header::{Column, ColumnMap, BODY_ACCEL_COLUMNS, REQUIRED_COLUMNS};

/// Row counts from one ingest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub kept: usize,
    /// Rows with a missing or non-numeric field
    pub malformed: usize,
    /// Rows at (0, 0), logged before the GPS had a lock
    pub no_fix: usize,
    /// Rows whose timestamp went backwards
    pub out_of_order: usize,
}

impl IngestSummary {
    pub fn skipped(&self) -> usize {
        self.malformed + self.no_fix + self.out_of_order
    }
}

impl Display for IngestSummary {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "kept {} rows, skipped {} ({} unparsable, {} without GPS fix, {} out of order)",
            self.kept,
            self.skipped(),
            self.malformed,
            self.no_fix,
            self.out_of_order
        )
    }
}

/// Which axes fill `Sample::acceleration`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccelFrame {
    /// `ax_b`, `ay_b`, `az_b` from the log
    Body,
    /// Only world-frame `ax_w`, `ay_w` were logged; z is zero
    World,
}

/// A loaded log: its trajectory and how many rows made it in
#[derive(Clone, Debug)]
pub struct Ingested {
    pub trajectory: Trajectory,
    pub summary: IngestSummary,
    pub accel_frame: AccelFrame,
}

/// Read a telemetry CSV from any reader
pub fn ingest_reader<R: Read>(reader: R) -> Result<Ingested> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns = ColumnMap::resolve(&headers)?;
    let accel_frame = if columns.has_body_accel() {
        AccelFrame::Body
    } else {
        warn!("Log has no ax_b/ay_b/az_b columns, using world-frame acceleration");
        AccelFrame::World
    };

    let mut trajectory = Trajectory::new();
    let mut summary = IngestSummary::default();

    for (i, record) in csv_reader.records().enumerate() {
        let row = i + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!("row {}: unreadable record: {}", row, e);
                summary.malformed += 1;
                continue;
            }
        };

        let sample = match parse_row(&record, &columns, row) {
            Ok(sample) => sample,
            Err(e) => {
                debug!("{}", e);
                summary.malformed += 1;
                continue;
            }
        };

        match trajectory.push(sample) {
            AppendOutcome::Appended => summary.kept += 1,
            AppendOutcome::NoFix => summary.no_fix += 1,
            AppendOutcome::NonFinite => summary.malformed += 1,
            AppendOutcome::OutOfOrder => summary.out_of_order += 1,
        }
    }

    info!("Ingested log: {}", summary);
    Ok(Ingested {
        trajectory,
        summary,
        accel_frame,
    })
}

/// Read a telemetry CSV from disk. `.gz` files are decompressed on the fly.
pub fn ingest_path(path: &Path) -> Result<Ingested> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        ingest_reader(BufReader::new(GzDecoder::new(file)))
    } else {
        ingest_reader(BufReader::new(file))
    }
}

fn parse_field(record: &StringRecord, index: usize, name: &str, row: usize) -> Result<f64> {
    let raw = record.get(index).ok_or_else(|| TraceError::RowParse {
        row,
        reason: format!("missing column '{}'", name),
    })?;
    let value: f64 = raw.parse().map_err(|_| TraceError::RowParse {
        row,
        reason: format!("'{}' is not a number in column '{}'", raw, name),
    })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TraceError::RowParse {
            row,
            reason: format!("non-finite value in column '{}'", name),
        })
    }
}

fn parse_row(record: &StringRecord, columns: &ColumnMap, row: usize) -> Result<Sample> {
    let field = |column: Column| parse_field(record, columns.index(column), column.name(), row);

    let lat = field(Column::Lat)?;
    let lon = field(Column::Lon)?;
    let millis = field(Column::Millis)?;
    if millis < 0.0 {
        return Err(TraceError::RowParse {
            row,
            reason: format!("negative timestamp {}", millis),
        });
    }
    let vx = field(Column::VxImu)?;
    let vy = field(Column::VyImu)?;
    let ax_w = field(Column::AxW)?;
    let ay_w = field(Column::AyW)?;

    let body = match columns.body_accel() {
        Some([ix, iy, iz]) => BodyAccel::new(
            parse_field(record, ix, BODY_ACCEL_COLUMNS[0], row)?,
            parse_field(record, iy, BODY_ACCEL_COLUMNS[1], row)?,
            parse_field(record, iz, BODY_ACCEL_COLUMNS[2], row)?,
        ),
        None => BodyAccel::new(ax_w, ay_w, 0.0),
    };

    Ok(Sample::new(
        GeoPoint::new(lat, lon),
        millis.round() as u64,
        BodyVelocity::new(vx, vy),
        body,
    )
    .with_world_accel(WorldAccel::new(ax_w, ay_w)))
}

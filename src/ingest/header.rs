//! Header resolution for telemetry CSV logs
//!
//! Columns are found by case-insensitive substring match so both the raw
//! logger output and the relabeled 27-field run files are accepted, in any
//! column order.

use csv::StringRecord;

use crate::error::{Result, TraceError};

/// Semantic columns the ingestor needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    Lat,
    Lon,
    Millis,
    VxImu,
    VyImu,
    AxW,
    AyW,
}

const COLUMN_COUNT: usize = 7;

pub const REQUIRED_COLUMNS: [Column; COLUMN_COUNT] = [
    Column::Lat,
    Column::Lon,
    Column::Millis,
    Column::VxImu,
    Column::VyImu,
    Column::AxW,
    Column::AyW,
];

impl Column {
    /// Aliases in priority order. The first is the canonical name.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Lat => &["lat"],
            Column::Lon => &["lon"],
            // Raw logger files carry a `time` column instead of `millis`
            Column::Millis => &["millis", "time"],
            Column::VxImu => &["vx_imu"],
            Column::VyImu => &["vy_imu"],
            Column::AxW => &["ax_w"],
            Column::AyW => &["ay_w"],
        }
    }

    pub fn name(self) -> &'static str {
        self.aliases()[0]
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Body-frame acceleration columns. Optional, but resolved as a group.
pub const BODY_ACCEL_COLUMNS: [&str; 3] = ["ax_b", "ay_b", "az_b"];

/// Resolved header indices for every required column
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMap {
    indices: [usize; COLUMN_COUNT],
    body: Option<[usize; 3]>,
}

impl ColumnMap {
    pub fn resolve(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();

        let mut indices = [0usize; COLUMN_COUNT];
        let mut missing = Vec::new();
        for column in REQUIRED_COLUMNS {
            let found = column
                .aliases()
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h.contains(alias)));
            match found {
                Some(index) => indices[column.slot()] = index,
                None => missing.push(column.name().to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(TraceError::SchemaMismatch { missing });
        }

        let mut body = [0usize; 3];
        let mut found_all = true;
        for (slot, name) in BODY_ACCEL_COLUMNS.iter().enumerate() {
            match normalized.iter().position(|h| h.contains(name)) {
                Some(index) => body[slot] = index,
                None => found_all = false,
            }
        }

        Ok(Self {
            indices,
            body: found_all.then_some(body),
        })
    }

    pub fn index(&self, column: Column) -> usize {
        self.indices[column.slot()]
    }

    /// Indices of `ax_b`, `ay_b`, `az_b` when all three are present
    pub fn body_accel(&self) -> Option<[usize; 3]> {
        self.body
    }

    pub fn has_body_accel(&self) -> bool {
        self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_any_order_and_case() {
        let headers = StringRecord::from(vec![" Lon", "Millis ", "LAT", "vy_imu", "VX_IMU", "ax_w", "AY_W"]);
        let map = ColumnMap::resolve(&headers).unwrap();
        assert_eq!(map.index(Column::Lon), 0);
        assert_eq!(map.index(Column::Millis), 1);
        assert_eq!(map.index(Column::Lat), 2);
        assert_eq!(map.index(Column::VyImu), 3);
        assert_eq!(map.index(Column::VxImu), 4);
        assert_eq!(map.index(Column::AyW), 6);
    }

    #[test]
    fn test_time_fallback_only_without_millis() {
        let raw = StringRecord::from(vec!["time", "lat", "lon", "vx_imu", "vy_imu", "ax_w", "ay_w"]);
        assert_eq!(ColumnMap::resolve(&raw).unwrap().index(Column::Millis), 0);

        let both = StringRecord::from(vec!["time", "millis", "lat", "lon", "vx_imu", "vy_imu", "ax_w", "ay_w"]);
        assert_eq!(ColumnMap::resolve(&both).unwrap().index(Column::Millis), 1);
    }

    #[test]
    fn test_body_accel_resolved_as_group() {
        let full = StringRecord::from(vec![
            "lat", "lon", "millis", "vx_imu", "vy_imu", "ax_w", "ay_w", "AX_B", "ay_b", "az_b",
        ]);
        assert_eq!(ColumnMap::resolve(&full).unwrap().body_accel(), Some([7, 8, 9]));

        let partial = StringRecord::from(vec![
            "lat", "lon", "millis", "vx_imu", "vy_imu", "ax_w", "ay_w", "ax_b", "ay_b",
        ]);
        assert!(!ColumnMap::resolve(&partial).unwrap().has_body_accel());
    }

    #[test]
    fn test_missing_columns_reported() {
        let headers = StringRecord::from(vec!["lat", "lon", "vx_imu", "ax_w"]);
        match ColumnMap::resolve(&headers) {
            Err(TraceError::SchemaMismatch { missing }) => {
                assert_eq!(missing, vec!["millis", "vy_imu", "ay_w"]);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }
}

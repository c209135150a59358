//! # Sheet Processing
//!
//! Validates a sheet's schema, materializes its data rows and establishes the
//! canonical per-sheet order.
//!
//! Rows with an unparseable coordinate or an empty timestamp are dropped without
//! error; only the count is logged. A sheet that lacks a required column is
//! rejected as a whole with a [`SchemaError`], which callers collect and report
//! while other sheets proceed.

use log::debug;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::columns::{find_column_index, ColumnRole, ColumnRoles};
use crate::records::{compare_by_date_time, compare_by_timestamp};
use crate::{geo_utils, materialize, CellValue, GpsPoint, LocationRecord, PipelineConfig, RawSheet};

/// Per-sheet schema problem. Never fatal for the load as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SchemaError {
    #[error("sheet '{sheet}' is missing required columns: {}", join_roles(.missing))]
    MissingRequiredColumns {
        sheet: String,
        missing: Vec<ColumnRole>,
    },

    #[error("sheet '{sheet}' has no header row")]
    EmptySheet { sheet: String },

    #[error("sheet '{sheet}' has no column named '{column}'")]
    MissingGroupColumn { sheet: String, column: String },
}

impl SchemaError {
    /// Name of the sheet the problem belongs to.
    pub fn sheet(&self) -> &str {
        match self {
            Self::MissingRequiredColumns { sheet, .. }
            | Self::EmptySheet { sheet }
            | Self::MissingGroupColumn { sheet, .. } => sheet,
        }
    }
}

fn join_roles(roles: &[ColumnRole]) -> String {
    roles
        .iter()
        .map(ColumnRole::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve column roles and check the sheet can yield records.
///
/// # Example
/// ```
/// use location_grouper::{validate, PipelineConfig, SchemaError};
///
/// let config = PipelineConfig::default();
/// assert!(validate(&["ts_local", "lat", "lng"], "a", &config).is_ok());
///
/// let err = validate(&["date", "lat", "lng"], "b", &config).unwrap_err();
/// assert!(matches!(err, SchemaError::MissingRequiredColumns { .. }));
/// ```
pub fn validate<H: AsRef<str>>(
    headers: &[H],
    sheet_name: &str,
    config: &PipelineConfig,
) -> Result<ColumnRoles, SchemaError> {
    if headers.is_empty() {
        return Err(SchemaError::EmptySheet {
            sheet: sheet_name.to_string(),
        });
    }

    let roles = ColumnRoles::resolve(headers, &config.keywords, config.exact_header_match);
    if !roles.is_complete() {
        return Err(SchemaError::MissingRequiredColumns {
            sheet: sheet_name.to_string(),
            missing: roles.missing(),
        });
    }
    Ok(roles)
}

/// Materialize every data row, drop invalid records and sort.
///
/// Sheets with a combined timestamp column sort by parsed timestamp; the rest
/// by parsed date, then time text. The sort is stable, so rows with equal keys
/// keep their sheet order.
///
/// # Arguments
/// * `sheet` - Sheet whose first row is the header row
/// * `roles` - Result of [`validate`] for that header row
/// * `config` - Serial threshold and time zones
///
/// # Returns
/// Valid records in time order. Dropped rows are only counted in the log.
pub fn process(
    sheet: &RawSheet,
    roles: &ColumnRoles,
    config: &PipelineConfig,
) -> Vec<LocationRecord> {
    let headers = sheet.headers();
    let data_rows = sheet.data_rows();

    let mut records: Vec<LocationRecord> = data_rows
        .iter()
        .enumerate()
        .map(|(index, row)| materialize(row, &headers, roles, index + 2, &sheet.name, config))
        .filter(LocationRecord::is_valid)
        .collect();

    let dropped = data_rows.len() - records.len();
    if dropped > 0 {
        debug!(
            "[Sheet] {}: dropped {} of {} rows (invalid coordinates or timestamp)",
            sheet.name,
            dropped,
            data_rows.len()
        );
    }

    if roles.timestamp.is_some() {
        records.sort_by(compare_by_timestamp);
    } else {
        records.sort_by(compare_by_date_time);
    }
    records
}

/// Validate then process.
pub fn load_sheet(
    sheet: &RawSheet,
    config: &PipelineConfig,
) -> Result<Vec<LocationRecord>, SchemaError> {
    let roles = validate(&sheet.headers(), &sheet.name, config)?;
    Ok(process(sheet, &roles, config))
}

/// Label data for a sheet list entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetSummary {
    pub name: String,
    /// Data rows, header excluded
    pub row_count: usize,
    /// Track length over consecutive rows in sheet order, kilometers
    pub distance_km: f64,
}

/// Row count and raw-order track length of a sheet.
///
/// Works on any sheet, valid or not: only the coordinate columns are looked up,
/// and hops touching an unparseable coordinate are skipped.
pub fn summarize(sheet: &RawSheet, config: &PipelineConfig) -> SheetSummary {
    let headers = sheet.headers();
    let data_rows = sheet.data_rows();
    let find = |role| {
        find_column_index(&headers, config.keywords.for_role(role), config.exact_header_match)
    };

    let distance_km = match (find(ColumnRole::Latitude), find(ColumnRole::Longitude)) {
        (Some(lat), Some(lng)) if data_rows.len() > 1 => {
            let coordinate = |row: &[CellValue], index: usize| {
                row.get(index).map(|cell| cell.to_coordinate()).unwrap_or(f64::NAN)
            };
            let points: Vec<GpsPoint> = data_rows
                .iter()
                .map(|row| GpsPoint::new(coordinate(row, lat), coordinate(row, lng)))
                .collect();
            geo_utils::track_length_km(&points)
        }
        _ => 0.0,
    };

    SheetSummary {
        name: sheet.name.clone(),
        row_count: data_rows.len(),
        distance_km,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, rows: &[&[&str]]) -> RawSheet {
        RawSheet::new(
            name,
            rows.iter()
                .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_missing_coordinate_column_rejected() {
        let config = PipelineConfig::default();
        let err = validate(&["timestamp", "lat"], "trips", &config).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingRequiredColumns {
                sheet: "trips".to_string(),
                missing: vec![ColumnRole::Longitude],
            }
        );
        assert_eq!(err.to_string(), "sheet 'trips' is missing required columns: longitude");
        assert_eq!(err.sheet(), "trips");

        // neither coordinate
        let err = validate(&["timestamp", "memo"], "notes", &config).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingRequiredColumns {
                sheet: "notes".to_string(),
                missing: vec![ColumnRole::Latitude, ColumnRole::Longitude],
            }
        );
        assert_eq!(
            err.to_string(),
            "sheet 'notes' is missing required columns: latitude, longitude"
        );
        let sheet = sheet("notes", &[&["timestamp", "memo"], &["2024-01-15 08:00:00", "x"]]);
        assert!(load_sheet(&sheet, &config).is_err());
    }

    #[test]
    fn test_empty_sheet_rejected() {
        let config = PipelineConfig::default();
        let empty = RawSheet::new("blank", Vec::new());
        assert_eq!(
            load_sheet(&empty, &config).unwrap_err(),
            SchemaError::EmptySheet {
                sheet: "blank".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_rows_excluded() {
        let sheet = sheet(
            "s",
            &[
                &["timestamp", "lat", "lng"],
                &["2024-01-15 08:00:00", "37.5", "127.0"],
                &["2024-01-15 08:01:00", "abc", "127.0"],
                &["", "37.6", "127.1"],
                &["2024-01-15 08:02:00", "37.7", ""],
                &["2024-01-15 08:03:00", "37.8", "127.2"],
            ],
        );

        let records = load_sheet(&sheet, &PipelineConfig::default()).unwrap();
        let rows: Vec<usize> = records.iter().map(|r| r.row_index).collect();
        assert_eq!(rows, vec![2, 6]);
    }

    #[test]
    fn test_sorted_by_timestamp_and_stable() {
        let sheet = sheet(
            "s",
            &[
                &["timestamp", "lat", "lng", "tag"],
                &["2024-01-15 09:00:00", "37.5", "127.0", "late"],
                &["2024-01-15 08:00:00", "37.5", "127.0", "first"],
                &["2024-01-15 08:30:00", "37.5", "127.0", "middle"],
                &["2024-01-15 08:00:00", "37.5", "127.0", "second"],
                &["2024-01-15 08:00:00", "37.5", "127.0", "third"],
            ],
        );

        let records = load_sheet(&sheet, &PipelineConfig::default()).unwrap();
        let tags: Vec<String> = records.iter().map(|r| r.raw_data[3].to_string()).collect();
        assert_eq!(tags, vec!["first", "second", "third", "middle", "late"]);
    }

    #[test]
    fn test_sorted_by_date_then_time() {
        let sheet = sheet(
            "s",
            &[
                &["날짜", "시간", "위도", "경도"],
                &["2024-01-16", "07:00:00", "37.5", "127.0"],
                &["2024-01-15", "18:00:00", "37.5", "127.0"],
                &["2024-01-15", "09:00:00", "37.5", "127.0"],
            ],
        );

        let records = load_sheet(&sheet, &PipelineConfig::default()).unwrap();
        let stamps: Vec<&str> = records.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            vec!["2024-01-15 09:00:00", "2024-01-15 18:00:00", "2024-01-16 07:00:00"]
        );
    }

    #[test]
    fn test_process_is_repeatable() {
        let sheet = sheet(
            "s",
            &[
                &["timestamp", "lat", "lng"],
                &["2024-01-15 08:00:00", "37.5", "127.0"],
                &["2024-01-15 07:00:00", "37.6", "127.1"],
            ],
        );
        let config = PipelineConfig::default();
        assert_eq!(load_sheet(&sheet, &config), load_sheet(&sheet, &config));
    }

    #[test]
    fn test_summarize() {
        let sheet = sheet(
            "route",
            &[
                &["timestamp", "lat", "lng"],
                &["t1", "37.0", "127.0"],
                &["t2", "38.0", "127.0"],
                &["t3", "?", "127.0"],
            ],
        );

        let summary = summarize(&sheet, &PipelineConfig::default());
        assert_eq!(summary.name, "route");
        assert_eq!(summary.row_count, 3);
        assert!((summary.distance_km - 111.195).abs() < 0.1);
    }

    #[test]
    fn test_summarize_without_coordinates() {
        let sheet = sheet("notes", &[&["memo"], &["a"], &["b"]]);
        let summary = summarize(&sheet, &PipelineConfig::default());
        assert_eq!(summary.row_count, 2);
        assert_eq!(summary.distance_km, 0.0);
    }
}

//! # Location Grouper
//!
//! Normalization and grouping pipeline for GPS location logs kept in spreadsheets.
//!
//! This library provides:
//! - Header resolution for loosely named timestamp/date/time/latitude/longitude columns
//! - Conversion of spreadsheet serial dates into calendar strings in a fixed time zone
//! - Validated, chronologically sorted location records per sheet
//! - Hierarchical grouping by arbitrary columns with a cascading selection model
//!
//! ## Features
//!
//! - **`serde`** - Derive `Serialize`/`Deserialize` on all public data types
//! - **`json`** - Enable JSON export of rendered views (implies `serde`)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use location_grouper::{CellValue, RawSheet, Session};
//!
//! let sheet = RawSheet::new("Sheet1", vec![
//!     vec!["timestamp".into(), "lat".into(), "lng".into(), "driver".into()],
//!     vec!["2024-01-15 09:00:00".into(), CellValue::Number(37.56), CellValue::Number(126.97), "kim".into()],
//!     vec!["2024-01-15 08:00:00".into(), CellValue::Number(37.55), CellValue::Number(126.98), "kim".into()],
//! ]);
//!
//! let mut session = Session::default();
//! session.load(vec![sheet]);
//! session.set_group_columns(vec!["driver".to_string()]);
//!
//! let view = session.render();
//! assert_eq!(view.record_count(), 2);
//! ```

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod columns;
pub use columns::{resolve, ColumnRole, ColumnRoles, RoleKeywords};

pub mod temporal;
pub use temporal::{serial_to_calendar, to_fixed_offset, CalendarParts, TimeZoneConfig};

pub mod records;
pub use records::{materialize, sort_by_time};

pub mod sheet;
pub use sheet::{load_sheet, process, summarize, validate, SchemaError, SheetSummary};

pub mod grouping;
pub use grouping::{
    assign_groups, build_group_key, build_hierarchy, count, GroupNode, GroupTree, GroupingOutcome,
    GROUP_SEPARATOR, UNKNOWN_GROUP,
};

pub mod selection;
pub use selection::{SelectionLevel, SelectionState};

// Distance, bounds and path statistics
pub mod geo_utils;
pub use geo_utils::PathSegment;

pub mod ingest;
pub use ingest::{read_csv, sheets_from_csv, split_into_sheets, IngestError};

pub mod session;
pub use session::{GroupTrack, GroupView, Session, SheetTrack, View};

// ============================================================================
// Core Types
// ============================================================================

/// A single spreadsheet cell as produced by the parsing collaborator.
///
/// CSV sources only ever produce `Text` and `Empty`; spreadsheet sources may
/// also produce `Number` (including serial dates) and `Bool`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// True only for cells stored as numbers.
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Numeric view of the cell: numbers, or text that reads as a finite number.
    ///
    /// # Example
    /// ```
    /// use location_grouper::CellValue;
    /// assert_eq!(CellValue::from(" 45306 ").as_number(), Some(45306.0));
    /// assert_eq!(CellValue::from("abc").as_number(), None);
    /// assert_eq!(CellValue::Empty.as_number(), None);
    /// ```
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) if value.is_finite() => Some(*value),
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
            }
            _ => None,
        }
    }

    /// Lenient coordinate parse: reads the leading decimal number and ignores
    /// trailing text (`"37.5 N"` reads as 37.5). Returns NaN when no number leads.
    pub fn to_coordinate(&self) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Text(text) => parse_leading_float(text).unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Self::Empty
        } else {
            Self::Text(text.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(text: String) -> Self {
        if text.is_empty() {
            Self::Empty
        } else {
            Self::Text(text)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One sheet of tabular data. Row 0 holds the headers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawSheet {
    /// Sheet identifier, unique within one load
    pub name: String,
    /// All rows including the header row
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    /// Create a sheet from rows as given.
    pub fn new(name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }

    /// Create a sheet after removing fully blank rows.
    ///
    /// Returns `None` when nothing is left, so empty worksheets never enter a load.
    pub fn from_rows(name: &str, rows: Vec<Vec<CellValue>>) -> Option<Self> {
        let rows: Vec<Vec<CellValue>> = rows
            .into_iter()
            .filter(|row| !ingest::is_empty_row(row))
            .collect();
        if rows.is_empty() {
            return None;
        }
        Some(Self::new(name, rows))
    }

    /// Header names as text. Blank header cells become empty strings.
    pub fn headers(&self) -> Arc<[String]> {
        self.rows
            .first()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Rows after the header row.
    pub fn data_rows(&self) -> &[Vec<CellValue>] {
        self.rows.get(1..).unwrap_or(&[])
    }
}

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use location_grouper::GpsPoint;
/// let point = GpsPoint::new(37.5665, 126.9780); // Seoul
/// assert!(point.is_finite());
/// assert!(!GpsPoint::new(f64::NAN, 126.9780).is_finite());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both coordinates are finite numbers.
    ///
    /// Out-of-range values still count; logs are drawn as recorded.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Bounding box of a set of points, used by renderers to fit the map.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        geo_utils::compute_bounds(points)
    }
}

/// The canonical unit of the pipeline: one validated reading from one sheet row.
///
/// Records are created by [`materialize`] and never mutated afterwards, except
/// that grouping attaches a [`group`](LocationRecord::group) key to a copy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationRecord {
    /// Combined timestamp column value, or `"{date} {time}"`
    pub timestamp: String,
    /// Calendar date (`YYYY-MM-DD` when converted from a serial number)
    pub date: String,
    /// Time of day (`HH:MM:SS` when converted from a serial number)
    pub time: String,
    pub lat: f64,
    pub lng: f64,
    /// Original cells of the row
    pub raw_data: Vec<CellValue>,
    /// Cells with date-bearing values rewritten to calendar form
    pub converted_data: Vec<CellValue>,
    /// Header row of the owning sheet (shared)
    pub headers: Arc<[String]>,
    /// 1-based spreadsheet row number, header included
    pub row_index: usize,
    pub sheet_name: String,
    /// Composite group key, present only when grouping is active
    pub group: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) order: records::TimeKey,
}

impl LocationRecord {
    /// Both coordinates finite and a non-empty timestamp.
    pub fn is_valid(&self) -> bool {
        self.point().is_finite() && !self.timestamp.trim().is_empty()
    }

    /// Coordinates as a [`GpsPoint`].
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.lat, self.lng)
    }

    /// Header/value pairs for detail displays, using converted values and
    /// skipping blank cells.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.headers
            .iter()
            .zip(self.converted_data.iter())
            .filter(|(_, value)| !value.is_blank())
            .map(|(header, value)| (header.as_str(), value))
    }
}

/// Configuration for the normalization pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// Header keywords per semantic role, in priority order.
    /// Default: English and Korean names used by common GPS loggers.
    pub keywords: RoleKeywords,

    /// Require normalized headers to equal a keyword instead of containing it.
    /// Default: false
    pub exact_header_match: bool,

    /// Numbers above this are treated as spreadsheet serial dates when scanning
    /// date columns. Default: 40000.0 (roughly year 2009 onwards)
    pub serial_date_threshold: f64,

    /// Offsets used to turn serial numbers into displayed calendar strings.
    /// Default: naive values read as UTC, displayed at UTC+9
    pub timezone: TimeZoneConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keywords: RoleKeywords::default(),
            exact_header_match: false,
            serial_date_threshold: temporal::SERIAL_DATE_THRESHOLD,
            timezone: TimeZoneConfig::default(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read the leading decimal number of `text`, ignoring whatever follows it.
pub(crate) fn parse_leading_float(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    text[..end].parse::<f64>().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_finite() {
        assert!(GpsPoint::new(37.5665, 126.9780).is_finite());
        assert!(GpsPoint::new(91.0, 0.0).is_finite());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_finite());
        assert!(!GpsPoint::new(0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_parse_leading_float() {
        assert_eq!(parse_leading_float("37.5"), Some(37.5));
        assert_eq!(parse_leading_float("  -12.25abc"), Some(-12.25));
        assert_eq!(parse_leading_float("5."), Some(5.0));
        assert_eq!(parse_leading_float(".5"), Some(0.5));
        assert_eq!(parse_leading_float("1e3x"), Some(1000.0));
        assert_eq!(parse_leading_float("2e"), Some(2.0));
        assert_eq!(parse_leading_float("abc"), None);
        assert_eq!(parse_leading_float("-"), None);
        assert_eq!(parse_leading_float(""), None);
    }

    #[test]
    fn test_cell_numbers() {
        assert_eq!(CellValue::Number(45306.5).as_number(), Some(45306.5));
        assert_eq!(CellValue::from("12").as_number(), Some(12.0));
        assert_eq!(CellValue::from("inf").as_number(), None);
        assert_eq!(CellValue::Bool(true).as_number(), None);
        assert!(CellValue::Number(1.0).is_number());
        assert!(!CellValue::from("1").is_number());
        assert!(CellValue::to_coordinate(&CellValue::from("abc")).is_nan());
        assert_eq!(CellValue::from("126.9 E").to_coordinate(), 126.9);
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Number(45306.0).to_string(), "45306");
        assert_eq!(CellValue::Number(0.5).to_string(), "0.5");
        assert_eq!(CellValue::Bool(true).to_string(), "true");
        assert_eq!(CellValue::Empty.to_string(), "");
        assert_eq!(CellValue::from("위도").to_string(), "위도");
    }

    #[test]
    fn test_raw_sheet_from_rows_strips_blank_rows() {
        let sheet = RawSheet::from_rows(
            "s",
            vec![
                vec!["lat".into(), "lng".into()],
                vec![CellValue::Empty, "  ".into()],
                vec![CellValue::Number(1.0), CellValue::Number(2.0)],
            ],
        )
        .unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.headers().to_vec(), vec!["lat".to_string(), "lng".to_string()]);
        assert_eq!(sheet.data_rows().len(), 1);

        assert!(RawSheet::from_rows("empty", vec![vec![CellValue::Empty]]).is_none());
    }

    #[test]
    fn test_bounds_from_points() {
        let bounds = Bounds::from_points(&[
            GpsPoint::new(37.0, 126.0),
            GpsPoint::new(38.0, 128.0),
        ])
        .unwrap();
        assert_eq!((bounds.min_lat, bounds.max_lat), (37.0, 38.0));
        assert_eq!((bounds.min_lng, bounds.max_lng), (126.0, 128.0));
    }
}

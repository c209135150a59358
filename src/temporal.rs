//! # Temporal Normalization
//!
//! Spreadsheet serial dates count days since 1899-12-30, with the fractional part
//! encoding the time of day. This module turns them into calendar strings in one
//! fixed display zone so every date and time shown or grouped shares a convention,
//! whatever encoding the source used.
//!
//! The conversion first builds a *naive* date-time from the serial (no zone), then
//! reads that naive value in [`TimeZoneConfig::source_offset_seconds`] and shifts
//! it to [`TimeZoneConfig::display_offset_seconds`] (UTC+9 by default).
//!
//! ```rust
//! use location_grouper::{serial_to_calendar, TimeZoneConfig};
//!
//! // 2024-01-15 05:30:00 read as UTC, shown at UTC+9
//! let parts = serial_to_calendar(45306.229166666664, &TimeZoneConfig::default()).unwrap();
//! assert_eq!(parts.date, "2024-01-15");
//! assert_eq!(parts.time, "14:30:00");
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::CellValue;

/// Serial number of 1970-01-01.
pub const SERIAL_UNIX_EPOCH: f64 = 25569.0;
pub const SECONDS_PER_DAY: i64 = 86_400;
/// Numbers above this are read as serial dates when scanning date columns.
pub const SERIAL_DATE_THRESHOLD: f64 = 40_000.0;
pub const DEFAULT_DISPLAY_OFFSET_HOURS: i32 = 9;

// Absorbs float error at exact second boundaries (0.5 * 86400 = 43199.99...)
const FRACTION_EPSILON: f64 = 1e-7;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y.%m.%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M",
];

/// Offsets applied when rendering naive serial values as calendar strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeZoneConfig {
    /// Zone the naive serial value is read in, in seconds east of UTC.
    /// Default: 0
    pub source_offset_seconds: i32,
    /// Zone calendar strings are produced in, in seconds east of UTC.
    /// Default: 32400 (UTC+9)
    pub display_offset_seconds: i32,
}

impl Default for TimeZoneConfig {
    fn default() -> Self {
        Self {
            source_offset_seconds: 0,
            display_offset_seconds: DEFAULT_DISPLAY_OFFSET_HOURS * 3600,
        }
    }
}

impl TimeZoneConfig {
    /// Seconds added to a naive value to reach display time.
    fn shift(&self) -> Duration {
        let offset = i64::from(self.display_offset_seconds) - i64::from(self.source_offset_seconds);
        Duration::seconds(offset)
    }
}

/// Calendar date (`YYYY-MM-DD`) and time (`HH:MM:SS`) in the display zone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalendarParts {
    pub date: String,
    pub time: String,
}

/// Build the naive date-time a serial number denotes.
///
/// Whole days are counted from the Unix epoch at [`SERIAL_UNIX_EPOCH`]; the
/// fraction becomes whole seconds after midnight. Returns `None` for non-finite
/// or out-of-range input.
pub fn serial_to_naive(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let days = (serial - SERIAL_UNIX_EPOCH).floor();
    if days.abs() > 3_000_000.0 {
        return None;
    }
    let midnight = DateTime::from_timestamp(days as i64 * SECONDS_PER_DAY, 0)?.naive_utc();

    let fraction = serial - serial.floor() + FRACTION_EPSILON;
    let total_seconds = (SECONDS_PER_DAY as f64 * fraction).floor() as i64;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;

    midnight.checked_add_signed(Duration::seconds(hours * 3600 + minutes * 60 + seconds))
}

/// Shift a naive value into the display zone and split it into date and time.
pub fn to_fixed_offset(naive: NaiveDateTime, timezone: &TimeZoneConfig) -> Option<CalendarParts> {
    let shifted = naive.checked_add_signed(timezone.shift())?;
    Some(CalendarParts {
        date: shifted.format("%Y-%m-%d").to_string(),
        time: shifted.format("%H:%M:%S").to_string(),
    })
}

/// Convert a serial number into display-zone calendar strings.
pub fn serial_to_calendar(serial: f64, timezone: &TimeZoneConfig) -> Option<CalendarParts> {
    to_fixed_offset(serial_to_naive(serial)?, timezone)
}

/// The cell's serial value when it is numeric (or numeric text) above `threshold`.
pub fn serial_value(cell: &CellValue, threshold: f64) -> Option<f64> {
    cell.as_number().filter(|value| *value > threshold)
}

/// Parse a calendar date written as text.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime(text).map(|datetime| datetime.date()))
}

/// Parse a date-time written as text.
///
/// RFC 3339 values with an offset are normalized to UTC; everything else is
/// read as naive. A bare date reads as midnight.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.naive_utc());
    }
    if let Some(datetime) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(datetime);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Point in time a timestamp cell denotes: serial numbers for numeric cells,
/// text parsing otherwise.
pub fn cell_instant(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Number(serial) => serial_to_naive(*serial),
        CellValue::Text(text) => parse_datetime(text),
        _ => None,
    }
}

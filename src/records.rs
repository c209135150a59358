//! Row materialization: one raw sheet row into one [`LocationRecord`].

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::columns::ColumnRoles;
use crate::temporal::{self, serial_to_calendar};
use crate::{CellValue, LocationRecord, PipelineConfig};

/// Chronological sort key, parsed once when the record is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TimeKey {
    /// Parsed timestamp (combined column, or date and time together)
    pub(crate) instant: Option<NaiveDateTime>,
    /// Parsed calendar date
    pub(crate) day: Option<NaiveDate>,
    /// Time text, compared lexicographically
    pub(crate) time: String,
}

/// Build a record from one data row.
///
/// `row_index` is the 1-based spreadsheet row number including the header row.
/// Primary date and time cells stored as numbers are converted through the
/// display zone; the timestamp is the combined column's value when the sheet
/// has one, else `"{date} {time}"`. The record may be invalid (NaN coordinate,
/// empty timestamp); [`crate::sheet::process`] drops those.
///
/// # Arguments
/// * `row` - Data row cells, possibly shorter than the header row
/// * `headers` - Header row of the sheet, shared by all its records
/// * `roles` - Column indices resolved from `headers`
/// * `row_index` - Spreadsheet row number of `row`
/// * `sheet_name` - Owning sheet
/// * `config` - Serial threshold and time zones
///
/// # Returns
/// A record with its sort key already computed.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use location_grouper::{materialize, resolve, CellValue, PipelineConfig};
///
/// let headers: Arc<[String]> = ["위도", "경도", "날짜", "시간"]
///     .iter()
///     .map(|h| h.to_string())
///     .collect();
/// let config = PipelineConfig::default();
/// let roles = resolve(&headers, &config.keywords);
/// let row = vec![
///     CellValue::Number(37.5665),
///     CellValue::Number(126.9780),
///     CellValue::from("2024-01-15"),
///     CellValue::from("08:30:00"),
/// ];
///
/// let record = materialize(&row, &headers, &roles, 2, "Sheet1", &config);
/// assert_eq!(record.timestamp, "2024-01-15 08:30:00");
/// assert!(record.is_valid());
/// ```
pub fn materialize(
    row: &[CellValue],
    headers: &Arc<[String]>,
    roles: &ColumnRoles,
    row_index: usize,
    sheet_name: &str,
    config: &PipelineConfig,
) -> LocationRecord {
    let cell = |index: Option<usize>| index.and_then(|i| row.get(i));

    let date = resolve_part(cell(roles.date), config, |parts| parts.date);
    let time = resolve_part(cell(roles.time), config, |parts| parts.time);

    let timestamp_cell = cell(roles.timestamp);
    let timestamp = match (roles.timestamp, timestamp_cell) {
        (Some(_), Some(value)) => value.to_string(),
        (Some(_), None) => String::new(),
        (None, _) => format!("{} {}", date, time),
    };

    let converted_data = convert_row(row, headers, roles, &date, &time, config);

    let instant = match timestamp_cell {
        Some(value) => temporal::cell_instant(value),
        None => temporal::parse_datetime(&timestamp),
    };
    let order = TimeKey {
        instant,
        day: temporal::parse_date(&date),
        time: time.clone(),
    };

    LocationRecord {
        timestamp,
        date,
        time,
        lat: cell(roles.latitude).map(CellValue::to_coordinate).unwrap_or(f64::NAN),
        lng: cell(roles.longitude).map(CellValue::to_coordinate).unwrap_or(f64::NAN),
        raw_data: row.to_vec(),
        converted_data,
        headers: Arc::clone(headers),
        row_index,
        sheet_name: sheet_name.to_string(),
        group: None,
        order,
    }
}

/// Text of a date or time cell, converting numeric cells from serial form.
/// Serials that cannot be converted pass through as their number text.
fn resolve_part(
    cell: Option<&CellValue>,
    config: &PipelineConfig,
    pick: impl Fn(temporal::CalendarParts) -> String,
) -> String {
    match cell {
        Some(CellValue::Number(serial)) => serial_to_calendar(*serial, &config.timezone)
            .map(pick)
            .unwrap_or_else(|| serial.to_string()),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

/// Copy of the row with date-bearing cells rewritten to calendar form.
///
/// Every column whose header mentions "date" and holds a serial above the
/// threshold is converted, since a row may carry several date columns. The
/// primary date and time columns then receive the resolved strings.
fn convert_row(
    row: &[CellValue],
    headers: &[String],
    roles: &ColumnRoles,
    date: &str,
    time: &str,
    config: &PipelineConfig,
) -> Vec<CellValue> {
    let mut converted = row.to_vec();

    for (index, header) in headers.iter().enumerate() {
        if !header.to_lowercase().contains("date") {
            continue;
        }
        let Some(value) = row.get(index) else {
            continue;
        };
        if let Some(parts) = temporal::serial_value(value, config.serial_date_threshold)
            .and_then(|serial| serial_to_calendar(serial, &config.timezone))
        {
            converted[index] = CellValue::Text(parts.date);
        }
    }

    for (index, text) in [(roles.date, date), (roles.time, time)] {
        if let Some(slot) = index.and_then(|i| converted.get_mut(i)) {
            *slot = CellValue::from(text);
        }
    }

    converted
}

// ============================================================================
// Ordering
// ============================================================================

/// Order by parsed timestamp; unparseable timestamps sort last.
pub(crate) fn compare_by_timestamp(a: &LocationRecord, b: &LocationRecord) -> Ordering {
    let key = |r: &LocationRecord| (r.order.instant.is_none(), r.order.instant);
    key(a).cmp(&key(b))
}

/// Order by parsed date, then time text; unparseable dates sort last.
pub(crate) fn compare_by_date_time(a: &LocationRecord, b: &LocationRecord) -> Ordering {
    let key = |r: &LocationRecord| (r.order.day.is_none(), r.order.day);
    key(a)
        .cmp(&key(b))
        .then_with(|| a.order.time.cmp(&b.order.time))
}

/// Order for records pooled from several sheets: timestamp first, with the
/// date/time fallback deciding among records whose timestamps tie or fail to parse.
pub(crate) fn compare_chronological(a: &LocationRecord, b: &LocationRecord) -> Ordering {
    compare_by_timestamp(a, b).then_with(|| compare_by_date_time(a, b))
}

/// Stable chronological sort of pooled records.
pub fn sort_by_time(records: &mut [LocationRecord]) {
    records.sort_by(compare_chronological);
}

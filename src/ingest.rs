//! # Ingestion
//!
//! Turns CSV text into [`RawSheet`]s.
//!
//! CSV carries no types, so every cell arrives as text. A single CSV export may
//! also hold several logs one after another, each starting with its own header
//! row; [`split_into_sheets`] cuts those apart into `Sheet1`, `Sheet2`, ...
//!
//! ```rust
//! use location_grouper::{sheets_from_csv, PipelineConfig};
//!
//! let text = "\
//! timestamp,lat,lng
//! 2024-01-15 08:00:00,37.5,127.0
//! timestamp,lat,lng,driver
//! 2024-01-15 09:00:00,37.6,127.1,kim
//! ";
//! let sheets = sheets_from_csv(text.as_bytes(), &PipelineConfig::default()).unwrap();
//! assert_eq!(sheets.len(), 2);
//! assert_eq!(sheets[1].name, "Sheet2");
//! ```

use std::borrow::Cow;
use std::io::Read;

use csv::ReaderBuilder;
use log::{debug, info, warn};
use thiserror::Error;

use crate::columns::ColumnRoles;
use crate::{CellValue, PipelineConfig, RawSheet};

const DEFAULT_SHEET: &str = "Sheet1";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Read all CSV records as rows of text cells.
///
/// Rows may have different lengths. Empty fields become [`CellValue::Empty`].
/// Bytes that are not valid UTF-8 are replaced with U+FFFD instead of failing
/// the whole file, so legacy-encoded exports still load.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Vec<CellValue>>, IngestError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut lossy_rows = 0usize;
    for record in reader.byte_records() {
        let record = record?;
        let mut lossy = false;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| {
                let text = String::from_utf8_lossy(field);
                lossy |= matches!(text, Cow::Owned(_));
                CellValue::from(&*text)
            })
            .collect();
        if lossy {
            lossy_rows += 1;
        }
        rows.push(row);
    }
    if lossy_rows > 0 {
        warn!(
            "[Ingest] {} CSV rows contained invalid UTF-8; replaced undecodable bytes",
            lossy_rows
        );
    }
    debug!("[Ingest] Read {} CSV rows", rows.len());
    Ok(rows)
}

/// True when every cell is blank.
pub fn is_empty_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}

/// True when the row's cells would resolve every required column role.
///
/// Uses the same keywords and matching mode as [`validate`](crate::validate),
/// so every row that starts a sheet is a header the sheet processor accepts.
pub fn is_header_row(row: &[CellValue], config: &PipelineConfig) -> bool {
    if row.is_empty() {
        return false;
    }
    let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
    ColumnRoles::resolve(&cells, &config.keywords, config.exact_header_match).is_complete()
}

/// Split one CSV's rows into sheets at each header row.
///
/// The n-th header row starts `Sheet{n}`, which runs until the next header row.
/// Rows before the first header are discarded, and segments left with no data
/// row after removing empty rows are dropped (their number is not reused).
/// Without any header row, or when nothing survives, all rows form `Sheet1`.
pub fn split_into_sheets(rows: Vec<Vec<CellValue>>, config: &PipelineConfig) -> Vec<RawSheet> {
    let header_indices: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| is_header_row(row, config))
        .map(|(index, _)| index)
        .collect();

    let mut sheets = Vec::new();
    for (ordinal, &start) in header_indices.iter().enumerate() {
        let end = header_indices.get(ordinal + 1).copied().unwrap_or(rows.len());
        let segment: Vec<Vec<CellValue>> = rows[start..end]
            .iter()
            .filter(|row| !is_empty_row(row))
            .cloned()
            .collect();
        if segment.len() > 1 {
            sheets.push(RawSheet::new(&format!("Sheet{}", ordinal + 1), segment));
        } else {
            debug!("[Ingest] Header at row {} has no data rows; skipped", start + 1);
        }
    }

    if sheets.is_empty() {
        sheets.extend(RawSheet::from_rows(DEFAULT_SHEET, rows));
    }

    info!(
        "[Ingest] Split CSV into {} sheets ({} header rows found)",
        sheets.len(),
        header_indices.len()
    );
    sheets
}

/// Read CSV text and split it into sheets.
pub fn sheets_from_csv<R: Read>(
    reader: R,
    config: &PipelineConfig,
) -> Result<Vec<RawSheet>, IngestError> {
    let rows = read_csv(reader)?;
    Ok(split_into_sheets(rows, config))
}

//! Import file reading: extension gate and raw-row extraction.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader};
use tracing::debug;

use crate::error::{FieldgateError, Result};

/// An uploaded import file: original filename plus raw bytes.
#[derive(Debug, Clone)]
pub struct ImportFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercased filename extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
    }
}

/// A parsed data row keyed by header. A missing cell is `None` and falls
/// through alias chains; a present-but-empty cell is `Some("")` and stops
/// them.
pub type RawRow = HashMap<String, Option<String>>;

/// Parse an import file into raw rows.
///
/// Only `.csv`, `.xlsx`, and `.xls` pass the extension gate. The first
/// logical row is the header; a file with no data row below it is rejected.
pub fn parse(file: &ImportFile) -> Result<Vec<RawRow>> {
    let extension = file.extension().unwrap_or_default();
    let rows = match extension.as_str() {
        "csv" => parse_csv(&file.bytes)?,
        "xlsx" | "xls" => parse_sheet(&file.bytes)?,
        _ => return Err(FieldgateError::unsupported_format(&extension)),
    };
    if rows.is_empty() {
        return Err(FieldgateError::empty_file());
    }
    debug!(file = %file.name, rows = rows.len(), "Parsed import file");
    Ok(rows)
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                // Cells past the end of a short line are missing, not empty.
                (header.clone(), record.get(i).map(|c| c.trim().to_string()))
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn parse_sheet(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(FieldgateError::empty_file)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = sheet_rows
        .next()
        .ok_or_else(FieldgateError::empty_file)?
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        if sheet_row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = match sheet_row.get(i) {
                    // Spreadsheet tooling reports blank cells as empty, so
                    // they fall through alias chains rather than stopping
                    // them.
                    None | Some(Data::Empty) => None,
                    Some(cell) => Some(cell.to_string().trim().to_string()),
                };
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

//! Header alias resolution and cell coercion.
//!
//! Import files arrive with headers typed by hand, so every target field
//! carries an ordered alias list: the canonical snake_case column first,
//! then the human-readable variants seen in real uploads. Resolution takes
//! the first alias whose cell is present — a present-but-empty cell stops
//! the chain, a missing cell falls through to the next alias.
//!
//! Coercion never fails a row: a cell that does not parse as its field's
//! type becomes null and is left to validation.

use chrono::NaiveDate;

use super::file::RawRow;

/// First alias present in the row, in declaration order.
pub(crate) fn resolve<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|alias| row.get(*alias).and_then(|cell| cell.as_deref()))
}

/// Non-empty text, or `None`.
pub(crate) fn text(row: &RawRow, aliases: &[&str]) -> Option<String> {
    resolve(row, aliases)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn integer(row: &RawRow, aliases: &[&str]) -> Option<i64> {
    resolve(row, aliases).and_then(|s| s.trim().parse().ok())
}

pub(crate) fn float(row: &RawRow, aliases: &[&str]) -> Option<f64> {
    resolve(row, aliases).and_then(|s| s.trim().parse().ok())
}

/// Date normalized to ISO `YYYY-MM-DD`. Accepts the formats field staff
/// actually type; anything else becomes null.
pub(crate) fn date(row: &RawRow, aliases: &[&str]) -> Option<String> {
    let raw = resolve(row, aliases)?;
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw.trim(), format).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Delimiter-separated list with trimmed elements. Absent or empty cell
/// yields an empty list, never null.
pub(crate) fn list(row: &RawRow, aliases: &[&str], delimiter: char) -> Vec<String> {
    resolve(row, aliases)
        .map(|s| {
            s.split(delimiter)
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

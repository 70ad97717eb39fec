// src/record/format.rs

//! Plain-text record format used by the file sources and sinks.
//!
//! One record per line, fields separated by whitespace. Integers become
//! `Long`, other numbers `Double`, `null` becomes `Null`, anything else is
//! `Text`. Blank lines and lines starting with `#` are skipped.

use crate::errors::{IterdagError, Result};
use crate::record::{Field, Record};

/// Parse one line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Record>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let fields = trimmed
        .split_whitespace()
        .map(parse_field)
        .collect::<Vec<_>>();

    if fields.is_empty() {
        return Err(IterdagError::MalformedRecord(format!(
            "line {line_no}: no fields in {trimmed:?}"
        )));
    }

    Ok(Some(Record::new(fields)))
}

/// Parse a whole document, attaching line numbers to errors.
pub fn parse_records(contents: &str) -> Result<Vec<Record>> {
    let mut out = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if let Some(record) = parse_line(line, idx + 1)? {
            out.push(record);
        }
    }
    Ok(out)
}

fn parse_field(token: &str) -> Field {
    if token == "null" {
        return Field::Null;
    }
    if let Ok(v) = token.parse::<i64>() {
        return Field::Long(v);
    }
    let looks_numeric = token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if looks_numeric {
        if let Ok(v) = token.parse::<f64>() {
            return Field::Double(v);
        }
    }
    Field::Text(token.to_string())
}

/// Render a record as one line (without the trailing newline).
pub fn format_record(record: &Record) -> String {
    record
        .fields()
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

//! Batch file parsing
//!
//! Turns an uploaded CSV or JSON file into flat string records. Records that
//! cannot be read are reported with their row number; only an unreadable
//! file as a whole is an error.

use std::collections::HashMap;

use serde_json::Value;

use super::{ImportError, RowError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Uploaded file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Json,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFormat::Csv => "csv",
            ImportFormat::Json => "json",
        }
    }
}

/// One input record with its position in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// CSV: physical line (header is line 1). JSON: 1-based record index.
    pub row: usize,
    pub fields: HashMap<String, String>,
}

impl RawRecord {
    /// First non-blank value among `names`, trimmed
    pub fn get(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }
}

/// Parsed batch: readable records plus row-level errors
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub records: Vec<RawRecord>,
    pub errors: Vec<RowError>,
}

pub fn parse(format: ImportFormat, bytes: &[u8]) -> Result<ParsedBatch, ImportError> {
    match format {
        ImportFormat::Csv => parse_csv(bytes),
        ImportFormat::Json => parse_json(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<ParsedBatch, ImportError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    // Exports in legacy encodings (cp1251) are rejected whole
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::Malformed(format!("Invalid CSV file: {}", e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::Malformed(format!("Invalid CSV file: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut batch = ParsedBatch::default();
    for (index, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let row = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(index + 2);
                let fields = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.clone(), v.to_string()))
                    .collect();
                batch.records.push(RawRecord { row, fields });
            }
            Err(e) => {
                let row = e.position().map(|p| p.line() as usize).unwrap_or(index + 2);
                let message = format!("Row {}: unreadable record: {}", row, e);
                batch.errors.push(RowError::new(row, message));
            }
        }
    }

    Ok(batch)
}

fn parse_json(bytes: &[u8]) -> Result<ParsedBatch, ImportError> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| ImportError::Malformed(format!("Invalid JSON: {}", e)))?;

    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("records") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ImportError::Malformed(
                    "Invalid JSON: \"records\" must be an array".to_string(),
                ))
            }
            None => Vec::new(),
        },
        _ => {
            return Err(ImportError::Malformed(
                "Invalid JSON: expected an array of records".to_string(),
            ))
        }
    };

    let mut batch = ParsedBatch::default();
    for (index, item) in items.into_iter().enumerate() {
        let row = index + 1;
        match item {
            Value::Object(object) => {
                let fields = object
                    .into_iter()
                    .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
                    .collect();
                batch.records.push(RawRecord { row, fields });
            }
            _ => batch
                .errors
                .push(RowError::new(row, format!("Record {}: expected an object", row))),
        }
    }

    Ok(batch)
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

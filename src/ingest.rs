//! Delimited-file ingest
//!
//! Parses an uploaded CSV into a raw record set. Cells are typed by
//! inference: empty → null, integer → integer, finite float → float,
//! anything else stays a string. Column names are passed through as-is;
//! normalization belongs to the pipeline.

use serde_json::{Number, Value};

use crate::models::{RawRecord, RawRecordSet};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("file is empty or has no header row")]
    MissingHeader,

    #[error("duplicate column '{0}' in header")]
    DuplicateColumn(String),

    #[error("malformed CSV at line {line}: {message}")]
    Malformed { line: u64, message: String },
}

/// Parse CSV bytes with a header row into records
pub fn parse_csv(bytes: &[u8]) -> Result<RawRecordSet, IngestError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::None)
        .from_reader(bytes);

    let headers = reader.headers().map_err(malformed)?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::MissingHeader);
    }

    let mut columns: Vec<String> = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        if columns.iter().any(|c| c == name) {
            return Err(IngestError::DuplicateColumn(name.to_string()));
        }
        columns.push(name.to_string());
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(malformed)?;
        let record: RawRecord = columns
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| (name.clone(), infer_cell(cell)))
            .collect();
        records.push(record);
    }

    tracing::debug!("Parsed CSV: {} rows, {} columns", records.len(), columns.len());
    Ok(records)
}

/// Type a raw text cell
fn infer_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}

fn malformed(err: csv::Error) -> IngestError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    IngestError::Malformed {
        line,
        message: err.to_string(),
    }
}

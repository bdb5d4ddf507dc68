//! CSV encoding for report downloads.

use crate::models::Entry;
use service_core::error::AppError;

pub const CSV_FILENAME: &str = "report.csv";

pub const CSV_HEADER: [&str; 6] = ["Title", "Category", "Amount", "Date", "Type", "Notes"];

/// Prefixes cells that spreadsheets would evaluate as formulas.
pub fn neutralize(cell: &str) -> String {
    match cell.chars().next() {
        Some('=') | Some('+') | Some('-') | Some('@') => format!("'{}", cell),
        _ => cell.to_string(),
    }
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, AppError> {
    writer
        .into_inner()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to flush CSV: {}", e)))
}

pub fn encode_header() -> Result<Vec<u8>, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to write CSV: {}", e)))?;
    into_bytes(writer)
}

/// Encodes rows without a header so chunks can be concatenated.
///
/// Amounts are written as plain decimals so the column re-imports exactly.
pub fn encode_rows(entries: &[Entry]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for entry in entries {
        writer
            .write_record([
                neutralize(&entry.title),
                neutralize(entry.category_name.as_deref().unwrap_or("")),
                entry.amount.to_string(),
                entry.entry_date.format("%Y-%m-%d").to_string(),
                entry.type_label().to_string(),
                neutralize(&entry.notes),
            ])
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to write CSV: {}", e)))?;
    }

    into_bytes(writer)
}

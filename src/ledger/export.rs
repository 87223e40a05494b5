//! Read-only dumps of the ledger

use std::io::Write;
use std::str::FromStr;

use super::record::TriageRecord;
use super::store::{Ledger, LedgerError};

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("Unsupported export format: {} (expected json or csv)", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed to write JSON export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV export: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat CSV row; topics joined with `;`
#[derive(serde::Serialize)]
struct CsvRow<'a> {
    checksum: &'a str,
    source_path: &'a str,
    destination_path: &'a str,
    relative_path: &'a str,
    file_size: u64,
    file_extension: &'a str,
    triage: &'a str,
    confidence: Option<f64>,
    reason: &'a str,
    topics: String,
    llm_provider: &'a str,
    llm_model: &'a str,
    extracted_text_length: usize,
    truncated: bool,
    error_message: &'a str,
    processed_at: String,
}

impl<'a> From<&'a TriageRecord> for CsvRow<'a> {
    fn from(r: &'a TriageRecord) -> Self {
        Self {
            checksum: &r.checksum,
            source_path: &r.source_path,
            destination_path: r.destination_path.as_deref().unwrap_or(""),
            relative_path: &r.relative_path,
            file_size: r.file_size,
            file_extension: &r.file_extension,
            triage: r.triage.as_str(),
            confidence: r.confidence,
            reason: &r.reason,
            topics: r.topics.join(";"),
            llm_provider: &r.llm_provider,
            llm_model: &r.llm_model,
            extracted_text_length: r.extracted_text_length,
            truncated: r.truncated,
            error_message: r.error_message.as_deref().unwrap_or(""),
            processed_at: r.processed_at.to_rfc3339(),
        }
    }
}

/// Write every ledger record to `out`; returns the number of records written
pub fn export<W: Write>(ledger: &Ledger, format: ExportFormat, mut out: W) -> Result<usize, ExportError> {
    let records = ledger.all()?;

    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &records)?;
            out.write_all(b"\n")?;
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(&mut out);
            for record in &records {
                writer.serialize(CsvRow::from(record))?;
            }
            writer.flush()?;
        }
    }

    Ok(records.len())
}

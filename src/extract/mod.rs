//! Text extraction boundary
//!
//! The orchestrator only sees the `Extractor` trait: a file goes in, text or a
//! typed failure comes out. `DocumentParser` is the bundled pure-Rust backend.

mod document_parser;

pub use document_parser::DocumentParser;

use std::path::Path;

/// Text pulled out of a document
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    /// The backend cut the text at its own size cap
    pub truncated: bool,
}

impl Extraction {
    /// Length in characters after trimming, the measure used for `min_text_length`
    pub fn meaningful_len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse {format}: {message}")]
    Parse { format: &'static str, message: String },
}

/// Converts a file into normalized text
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError>;
}

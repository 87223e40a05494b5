use crate::ai::TransportError;
use crate::config::ConfigError;
use crate::ledger::{LedgerError, LockError};
use crate::relocate::RelocateError;
use crate::scanner::ScanError;

use super::summary::RunSummary;

/// Conditions that stop a run
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("fatal LLM error: {0}")]
    Llm(TransportError),
    #[error(transparent)]
    StorageFull(RelocateError),
    /// A fatal error after the run started; carries the progress so far
    #[error("run aborted: {cause}")]
    Aborted {
        summary: RunSummary,
        #[source]
        cause: Box<TriageError>,
    },
}

impl TriageError {
    /// Progress reached before an abort
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Aborted { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

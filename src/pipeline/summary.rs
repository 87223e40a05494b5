use serde::Serialize;
use std::fmt;

use crate::ledger::{Triage, TriageRecord};

/// Per-run counters, independent of the ledger contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Candidates reached, including skips and errors
    pub total: usize,
    pub evergreen: usize,
    pub temporal: usize,
    pub unknown: usize,
    pub errors: usize,
    /// Already in the ledger
    pub skipped: usize,
}

impl RunSummary {
    /// Count a written record; any error note counts as an error
    pub fn tally(&mut self, record: &TriageRecord) {
        if record.error_message.is_some() {
            self.errors += 1;
            return;
        }
        self.count(record.triage);
    }

    pub fn count(&mut self, triage: Triage) {
        match triage {
            Triage::Evergreen => self.evergreen += 1,
            Triage::Temporal => self.temporal += 1,
            Triage::Unknown => self.unknown += 1,
        }
    }

    pub fn log(&self) {
        tracing::info!(
            total = self.total,
            evergreen = self.evergreen,
            temporal = self.temporal,
            unknown = self.unknown,
            errors = self.errors,
            skipped = self.skipped,
            "Run summary"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total:     {}", self.total)?;
        writeln!(f, "Evergreen: {}", self.evergreen)?;
        writeln!(f, "Temporal:  {}", self.temporal)?;
        writeln!(f, "Unknown:   {}", self.unknown)?;
        writeln!(f, "Errors:    {}", self.errors)?;
        write!(f, "Skipped:   {}", self.skipped)
    }
}

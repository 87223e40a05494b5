//! Second pass over `unknown` records with a different threshold.
//!
//! Files are found where they currently are: the recorded destination if it
//! still exists, otherwise the original source. A changed label moves the file
//! to `<output>/<label>/<relative path>`. Dry runs write nothing.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::ai::ClassifyError;
use crate::ledger::{Triage, TriageRecord};
use crate::relocate::Relocator;

use super::error::TriageError;
use super::orchestrator::{Orchestrator, RELOCATION_ERROR_PREFIX};
use super::summary::RunSummary;

impl Orchestrator {
    /// Re-run classification for every `unknown` record
    pub async fn reclassify(
        &self,
        threshold: f64,
        output: &Path,
        dry_run: bool,
    ) -> Result<RunSummary, TriageError> {
        let mut summary = RunSummary::default();
        let result = self
            .reclassify_records(threshold, output, dry_run, &mut summary)
            .await;
        summary.log();

        result.map(|_| summary).map_err(|cause| TriageError::Aborted {
            summary,
            cause: Box::new(cause),
        })
    }

    async fn reclassify_records(
        &self,
        threshold: f64,
        output: &Path,
        dry_run: bool,
        summary: &mut RunSummary,
    ) -> Result<(), TriageError> {
        let _lock = self.acquire_lock()?;
        let relocator = Relocator::new(output, dry_run).with_mover(self.mover);
        let records = self.ledger.list_by_triage(Triage::Unknown)?;

        info!(records = records.len(), threshold, dry_run, "Starting reclassification");

        for record in records {
            summary.total += 1;
            self.reclassify_one(record, threshold, &relocator, summary).await?;
        }

        Ok(())
    }

    async fn reclassify_one(
        &self,
        mut record: TriageRecord,
        threshold: f64,
        relocator: &Relocator,
        summary: &mut RunSummary,
    ) -> Result<(), TriageError> {
        let Some(current) = current_location(&record) else {
            warn!(checksum = %record.checksum, source = %record.source_path, "File no longer exists");
            summary.errors += 1;
            return Ok(());
        };

        let text = match self.ledger.cached_text(&record.checksum)? {
            Some(text) => text,
            None => match self.extractor.extract(&current) {
                Ok(extraction) => {
                    self.ledger.cache_text(&record.checksum, &extraction.text)?;
                    extraction.text
                }
                Err(e) => {
                    warn!(path = %current.display(), "Extraction failed: {}", e);
                    summary.errors += 1;
                    return Ok(());
                }
            },
        };

        if text.trim().chars().count() < self.settings.min_text_length {
            debug!(path = %current.display(), "Still too little text to classify");
            summary.unknown += 1;
            return Ok(());
        }

        let filename = current
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let classification = match self
            .classifier
            .classify_with_threshold(&text, &filename, &record.file_extension, record.truncated, threshold)
            .await
        {
            Ok(classification) => classification,
            Err(ClassifyError::Fatal(e)) => return Err(TriageError::Llm(e)),
            Err(e) => {
                warn!(path = %current.display(), "Classification failed: {}", e);
                summary.errors += 1;
                return Ok(());
            }
        };

        let label = classification.triage;
        record.confidence = classification.confidence;
        record.reason = classification.reason;
        record.topics = classification.topics;
        record.truncated = classification.truncated;
        record.error_message = classification.error;
        record.llm_provider = self.classifier.provider().to_string();
        record.llm_model = self.classifier.model().to_string();
        record.processed_at = Utc::now();

        if label == Triage::Unknown {
            info!(path = %current.display(), confidence = ?record.confidence, "Still unknown");
            if !relocator.is_dry_run() {
                self.ledger.upsert(&record)?;
            }
            summary.tally(&record);
            return Ok(());
        }

        let relative = relative_path(&record, &current);
        match relocator.relocate(&current, label, &relative) {
            Ok(relocation) if !relocation.moved => {
                info!(
                    path = %current.display(),
                    triage = %label,
                    "[dry-run] would reclassify to {}",
                    relocation.destination.display()
                );
                summary.count(label);
            }
            Ok(relocation) => {
                record.triage = label;
                record.destination_path = Some(relocation.destination.display().to_string());
                self.ledger.upsert(&record)?;
                self.ledger.forget_text(&record.checksum)?;
                info!(
                    path = %current.display(),
                    triage = %label,
                    confidence = ?record.confidence,
                    "Reclassified"
                );
                summary.tally(&record);
            }
            Err(e) => {
                warn!(path = %current.display(), "{}", e);
                summary.errors += 1;
                // Keep the file's recorded location truthful; only note the failure
                if let Some(mut stored) = self.ledger.lookup(&record.checksum)? {
                    stored.error_message = Some(format!("{}{}", RELOCATION_ERROR_PREFIX, e));
                    self.ledger.upsert(&stored)?;
                }
                if e.is_fatal() {
                    return Err(TriageError::StorageFull(e));
                }
            }
        }

        Ok(())
    }
}

/// Destination if it still exists, else the original source
fn current_location(record: &TriageRecord) -> Option<PathBuf> {
    record
        .destination_path
        .as_ref()
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .or_else(|| Some(PathBuf::from(&record.source_path)).filter(|p| p.is_file()))
}

fn relative_path(record: &TriageRecord, current: &Path) -> PathBuf {
    if record.relative_path.is_empty() {
        current
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&record.checksum))
    } else {
        PathBuf::from(&record.relative_path)
    }
}

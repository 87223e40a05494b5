//! Per-file state machine
//!
//! Scanned -> Deduped, or Scanned -> Extracting -> Classifying ->
//! ThresholdChecked -> Relocating -> Recorded. Extraction and classification
//! failures end in `unknown` and still relocate. Only fatal conditions leave
//! the loop early.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::ai::{select_transport, Classifier, ClassifierSettings, ClassifyError, RateLimiter};
use crate::config::Config;
use crate::extract::{DocumentParser, Extraction, Extractor};
use crate::ledger::{compute_checksum, FileDigest, Ledger, RunLock, Triage, TriageRecord};
use crate::relocate::{move_file, MoveFn, Relocator};
use crate::scanner::Scanner;

use super::error::TriageError;
use super::summary::RunSummary;

/// Marks an error note written because the move failed, not the decision
pub(crate) const RELOCATION_ERROR_PREFIX: &str = "Relocation failed: ";

/// Arguments of one `run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub source: PathBuf,
    pub output: PathBuf,
    pub dry_run: bool,
    /// Caps scanned candidates; overrides `input.max_files`
    pub limit: Option<usize>,
    /// Replaces the configured allow-list
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub min_text_length: usize,
    pub extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_files: Option<usize>,
    pub debug_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_text_length: config.text_extraction.min_text_length,
            extensions: config.input.extensions.clone(),
            exclude_patterns: config.input.exclude_patterns.clone(),
            max_files: Some(config.input.max_files).filter(|n| *n > 0),
            debug_dir: config.debug_dir(),
        }
    }
}

pub struct Orchestrator {
    pub(super) ledger: Ledger,
    pub(super) extractor: Arc<dyn Extractor>,
    pub(super) classifier: Classifier,
    pub(super) settings: PipelineSettings,
    pub(super) mover: MoveFn,
    lock_path: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        ledger: Ledger,
        extractor: Arc<dyn Extractor>,
        classifier: Classifier,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ledger,
            extractor,
            classifier,
            settings,
            mover: move_file,
            lock_path: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_mover(mut self, mover: MoveFn) -> Self {
        self.mover = mover;
        self
    }

    /// Hold the ledger's run lock during `run` and `reclassify`
    pub fn with_run_lock(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(db_path.into());
        self
    }

    /// Wire the production collaborators from configuration
    pub fn from_config(config: &Config, api_key: Option<String>) -> Result<Self, TriageError> {
        let transport = select_transport(&config.llm, api_key)?;
        let limiter = Arc::new(RateLimiter::per_minute(config.llm.rate_limit.requests_per_minute));
        let classifier = Classifier::new(
            transport,
            limiter,
            config.llm.model.clone(),
            ClassifierSettings::from_config(config),
        );

        let db_path = config.database_path();
        let ledger = Ledger::open(&db_path)?;

        Ok(Self::new(
            ledger,
            Arc::new(DocumentParser::new()),
            classifier,
            PipelineSettings::from_config(config),
        )
        .with_run_lock(db_path))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(super) fn acquire_lock(&self) -> Result<Option<RunLock>, TriageError> {
        match &self.lock_path {
            Some(path) => Ok(Some(RunLock::acquire(path)?)),
            None => Ok(None),
        }
    }

    /// Triage every candidate under `options.source`.
    ///
    /// A fatal error ends the run as `TriageError::Aborted`, carrying the
    /// counts reached so far.
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary, TriageError> {
        let mut summary = RunSummary::default();
        let result = self.run_files(options, &mut summary).await;
        summary.log();

        match result {
            Ok(()) => Ok(summary),
            Err(cause) => {
                error!("Run aborted: {}", cause);
                Err(TriageError::Aborted {
                    summary,
                    cause: Box::new(cause),
                })
            }
        }
    }

    async fn run_files(&self, options: &RunOptions, summary: &mut RunSummary) -> Result<(), TriageError> {
        let _lock = self.acquire_lock()?;

        let root = std::path::absolute(&options.source).unwrap_or_else(|_| options.source.clone());
        let extensions: &[String] = options
            .extensions
            .as_deref()
            .unwrap_or(&self.settings.extensions);
        let scanner = Scanner::new(&root, extensions, self.settings.exclude_patterns.as_slice())?;
        let relocator = Relocator::new(&options.output, options.dry_run).with_mover(self.mover);
        let limit = options.limit.or(self.settings.max_files);

        info!(
            source = %root.display(),
            output = %options.output.display(),
            dry_run = options.dry_run,
            "Starting triage run"
        );

        for (index, entry) in scanner.scan()?.enumerate() {
            if limit.is_some_and(|limit| index >= limit) {
                info!("File limit of {} reached", index);
                break;
            }
            summary.total += 1;

            match entry {
                Ok(path) => self.process_file(&path, &root, &relocator, summary).await?,
                Err(e) if e.is_transient() => {
                    warn!("{}", e);
                    summary.errors += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Drive one file to a recorded decision. `Err` only for fatal conditions.
    pub(super) async fn process_file(
        &self,
        path: &Path,
        root: &Path,
        relocator: &Relocator,
        summary: &mut RunSummary,
    ) -> Result<(), TriageError> {
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        let digest = match compute_checksum(path) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(path = %path.display(), "Skipping unreadable file: {}", e);
                summary.errors += 1;
                return Ok(());
            }
        };

        if let Some(prior) = self.ledger.lookup(&digest.sha256)? {
            if prior.is_relocated() || relocator.is_dry_run() {
                debug!(path = %path.display(), checksum = %digest.sha256, "Already processed");
                summary.skipped += 1;
                return Ok(());
            }

            // Classified earlier but never moved: reuse the decision
            info!(path = %path.display(), triage = %prior.triage, "Relocating previously classified file");
            let record = TriageRecord {
                source_path: path.display().to_string(),
                relative_path: relative.to_string_lossy().to_string(),
                error_message: prior
                    .error_message
                    .clone()
                    .filter(|m| !m.starts_with(RELOCATION_ERROR_PREFIX)),
                ..prior
            };
            return self.relocate_and_record(path, &relative, record, relocator, summary);
        }

        let record = self.decide(path, &relative, &digest).await?;
        self.relocate_and_record(path, &relative, record, relocator, summary)
    }

    /// Extract and classify; the record comes back without a destination
    async fn decide(
        &self,
        path: &Path,
        relative: &Path,
        digest: &FileDigest,
    ) -> Result<TriageRecord, TriageError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let mut record = TriageRecord {
            source_path: path.display().to_string(),
            destination_path: None,
            relative_path: relative.to_string_lossy().to_string(),
            checksum: digest.sha256.clone(),
            file_size: digest.size,
            file_extension: extension.clone(),
            triage: Triage::Unknown,
            confidence: None,
            reason: String::new(),
            topics: Vec::new(),
            llm_provider: String::new(),
            llm_model: String::new(),
            extracted_text_length: 0,
            truncated: false,
            error_message: None,
            processed_at: Utc::now(),
        };

        let extraction = match self.extractor.extract(path) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(path = %path.display(), "Extraction failed: {}", e);
                record.reason = format!("Text extraction failed: {}", e);
                record.error_message = Some(e.to_string());
                return Ok(record);
            }
        };

        record.extracted_text_length = extraction.meaningful_len();
        record.truncated = extraction.truncated;
        self.dump_debug_text(relative, &extraction);

        if record.extracted_text_length < self.settings.min_text_length {
            info!(
                path = %path.display(),
                "Insufficient text ({} < {} characters)",
                record.extracted_text_length,
                self.settings.min_text_length
            );
            record.reason = format!(
                "Insufficient text: {} characters extracted, {} required",
                record.extracted_text_length, self.settings.min_text_length
            );
            self.ledger.cache_text(&digest.sha256, &extraction.text)?;
            return Ok(record);
        }

        record.llm_provider = self.classifier.provider().to_string();
        record.llm_model = self.classifier.model().to_string();

        match self
            .classifier
            .classify(&extraction.text, &filename, &extension, extraction.truncated)
            .await
        {
            Ok(classification) => {
                record.triage = classification.triage;
                record.confidence = classification.confidence;
                record.reason = classification.reason;
                record.topics = classification.topics;
                record.truncated = classification.truncated;
                record.error_message = classification.error;
            }
            Err(ClassifyError::Fatal(e)) => return Err(TriageError::Llm(e)),
            Err(e) => {
                warn!(path = %path.display(), "Classification failed: {}", e);
                record.reason = "Classification failed".to_string();
                record.error_message = Some(e.to_string());
            }
        }

        // Only `unknown` records are read back, by reclassify
        if record.triage == Triage::Unknown {
            self.ledger.cache_text(&digest.sha256, &extraction.text)?;
        }

        Ok(record)
    }

    /// Relocate (or simulate), then upsert. A full output volume is fatal
    /// but the decision is written first.
    fn relocate_and_record(
        &self,
        path: &Path,
        relative: &Path,
        mut record: TriageRecord,
        relocator: &Relocator,
        summary: &mut RunSummary,
    ) -> Result<(), TriageError> {
        let mut fatal = None;

        match relocator.relocate(path, record.triage, relative) {
            Ok(relocation) => {
                record.destination_path = relocation
                    .moved
                    .then(|| relocation.destination.display().to_string());
            }
            Err(e) => {
                error!(path = %path.display(), "{}", e);
                record.destination_path = None;
                record.error_message = Some(format!("{}{}", RELOCATION_ERROR_PREFIX, e));
                if e.is_fatal() {
                    fatal = Some(TriageError::StorageFull(e));
                }
            }
        }

        record.processed_at = Utc::now();
        self.ledger.upsert(&record)?;

        info!(
            path = %path.display(),
            triage = %record.triage,
            confidence = ?record.confidence,
            "Recorded"
        );

        summary.tally(&record);
        fatal.map_or(Ok(()), Err)
    }

    /// Write extracted text to `<debug_dir>/<relative>.md`; failures only warn
    fn dump_debug_text(&self, relative: &Path, extraction: &Extraction) {
        let Some(dir) = &self.settings.debug_dir else {
            return;
        };

        let mut name = relative.as_os_str().to_os_string();
        name.push(".md");
        let target = dir.join(name);

        let written = target
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(&target, &extraction.text));
        if let Err(e) = written {
            warn!(path = %target.display(), "Failed to write debug text: {}", e);
        }
    }
}

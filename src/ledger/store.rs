//! SQLite-backed checksum ledger
//!
//! One row per distinct content checksum. Writes are single-statement upserts,
//! so a record is either fully committed or absent after a crash.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::record::{Triage, TriageRecord};

/// Errors raised by the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare ledger location {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger connection lock poisoned")]
    Poisoned,
}

/// Record counts grouped by triage label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub evergreen: u64,
    pub temporal: u64,
    pub unknown: u64,
    pub total: u64,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS triage_results (
        checksum TEXT PRIMARY KEY,
        source_path TEXT NOT NULL,
        destination_path TEXT,
        relative_path TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        file_extension TEXT NOT NULL,
        triage TEXT NOT NULL CHECK (triage IN ('evergreen', 'temporal', 'unknown')),
        confidence REAL,
        reason TEXT NOT NULL,
        topics TEXT NOT NULL,
        llm_provider TEXT NOT NULL,
        llm_model TEXT NOT NULL,
        extracted_text_length INTEGER NOT NULL,
        truncated INTEGER NOT NULL,
        error_message TEXT,
        processed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_triage ON triage_results (triage);
    CREATE INDEX IF NOT EXISTS idx_source_path ON triage_results (source_path);

    CREATE TABLE IF NOT EXISTS extracted_texts (
        checksum TEXT PRIMARY KEY,
        text TEXT NOT NULL,
        extracted_at TEXT NOT NULL
    );
"#;

const SELECT_COLUMNS: &str = "source_path, destination_path, relative_path, checksum, file_size,
    file_extension, triage, confidence, reason, topics, llm_provider, llm_model,
    extracted_text_length, truncated, error_message, processed_at";

/// Durable store of triage outcomes keyed by content checksum
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory ledger, used by tests and dry experiments
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Prior outcome for a checksum, if any
    pub fn lookup(&self, checksum: &str) -> Result<Option<TriageRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM triage_results WHERE checksum = ?1", SELECT_COLUMNS);
        Ok(conn.query_row(&sql, params![checksum], row_to_record).optional()?)
    }

    /// Most recent outcome recorded for a source path
    pub fn lookup_by_source(&self, source_path: &str) -> Result<Option<TriageRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM triage_results WHERE source_path = ?1
             ORDER BY processed_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(conn.query_row(&sql, params![source_path], row_to_record).optional()?)
    }

    /// Insert a record, replacing any prior record with the same checksum
    pub fn upsert(&self, record: &TriageRecord) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        let topics = serde_json::to_string(&record.topics)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        conn.execute(
            r#"
            INSERT INTO triage_results (
                source_path, destination_path, relative_path, checksum, file_size,
                file_extension, triage, confidence, reason, topics, llm_provider, llm_model,
                extracted_text_length, truncated, error_message, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(checksum) DO UPDATE SET
                source_path = excluded.source_path,
                destination_path = excluded.destination_path,
                relative_path = excluded.relative_path,
                file_size = excluded.file_size,
                file_extension = excluded.file_extension,
                triage = excluded.triage,
                confidence = excluded.confidence,
                reason = excluded.reason,
                topics = excluded.topics,
                llm_provider = excluded.llm_provider,
                llm_model = excluded.llm_model,
                extracted_text_length = excluded.extracted_text_length,
                truncated = excluded.truncated,
                error_message = excluded.error_message,
                processed_at = excluded.processed_at
            "#,
            params![
                record.source_path,
                record.destination_path,
                record.relative_path,
                record.checksum,
                record.file_size as i64,
                record.file_extension,
                record.triage.as_str(),
                record.confidence,
                record.reason,
                topics,
                record.llm_provider,
                record.llm_model,
                record.extracted_text_length as i64,
                record.truncated,
                record.error_message,
                record.processed_at.to_rfc3339(),
            ],
        )?;

        debug!(
            checksum = %record.checksum,
            triage = %record.triage,
            "Ledger upsert"
        );
        Ok(())
    }

    /// All records with the given label, oldest first
    pub fn list_by_triage(&self, triage: Triage) -> Result<Vec<TriageRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM triage_results WHERE triage = ?1 ORDER BY processed_at, checksum",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![triage.as_str()], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every record, oldest first
    pub fn all(&self) -> Result<Vec<TriageRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM triage_results ORDER BY processed_at, checksum",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Counts per label
    pub fn counts(&self) -> Result<LedgerCounts, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT triage, COUNT(*) FROM triage_results GROUP BY triage")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = LedgerCounts::default();
        for row in rows {
            let (label, count) = row?;
            let count = count.max(0) as u64;
            match label.parse::<Triage>() {
                Ok(Triage::Evergreen) => counts.evergreen = count,
                Ok(Triage::Temporal) => counts.temporal = count,
                Ok(Triage::Unknown) => counts.unknown = count,
                Err(_) => {}
            }
            counts.total += count;
        }
        Ok(counts)
    }

    /// Remember the extracted text for a checksum so reclassification can skip extraction
    pub fn cache_text(&self, checksum: &str, text: &str) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO extracted_texts (checksum, text, extracted_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(checksum) DO UPDATE SET text = excluded.text, extracted_at = excluded.extracted_at",
            params![checksum, text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Previously cached extraction for a checksum
    pub fn cached_text(&self, checksum: &str) -> Result<Option<String>, LedgerError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT text FROM extracted_texts WHERE checksum = ?1",
                params![checksum],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Drop the cached text once the record no longer needs reclassifying
    pub fn forget_text(&self, checksum: &str) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM extracted_texts WHERE checksum = ?1", params![checksum])?;
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BadColumn(String);

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TriageRecord> {
    let triage: String = row.get(6)?;
    let triage = triage
        .parse::<Triage>()
        .map_err(|e| conversion_error(6, BadColumn(e)))?;

    let topics: String = row.get(9)?;
    let topics: Vec<String> = serde_json::from_str(&topics).map_err(|e| conversion_error(9, e))?;

    let processed_at: String = row.get(15)?;
    let processed_at = DateTime::parse_from_rfc3339(&processed_at)
        .map_err(|e| conversion_error(15, e))?
        .with_timezone(&Utc);

    Ok(TriageRecord {
        source_path: row.get(0)?,
        destination_path: row.get(1)?,
        relative_path: row.get(2)?,
        checksum: row.get(3)?,
        file_size: row.get::<_, i64>(4)?.max(0) as u64,
        file_extension: row.get(5)?,
        triage,
        confidence: row.get(7)?,
        reason: row.get(8)?,
        topics,
        llm_provider: row.get(10)?,
        llm_model: row.get(11)?,
        extracted_text_length: row.get::<_, i64>(12)?.max(0) as usize,
        truncated: row.get(13)?,
        error_message: row.get(14)?,
        processed_at,
    })
}

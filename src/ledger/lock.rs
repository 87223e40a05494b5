//! Single-writer guard for the ledger
//!
//! Holds an exclusive `fs2` lock on `<db>.lock` while a run mutates the
//! ledger and moves files, so two runs can never interleave.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another triage run holds {0}")]
    Busy(PathBuf),
    #[error("failed to open lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the run lock next to the ledger database without blocking
    pub fn acquire(db_path: &Path) -> Result<Self, LockError> {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|_| LockError::Busy(path.clone()))?;

        tracing::debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { file, path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(path = %self.path.display(), "Released run lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("triage.db");

        let held = RunLock::acquire(&db).unwrap();
        assert!(temp_dir.path().join("triage.db.lock").exists());
        assert!(matches!(RunLock::acquire(&db), Err(LockError::Busy(_))));

        drop(held);
        assert!(RunLock::acquire(&db).is_ok());
    }
}

//! Relocation engine
//!
//! Moves a classified file to `<output>/<category>/<relative path>`. Moves are
//! a rename when possible and a verified copy + delete otherwise. An existing
//! destination is never overwritten; a ` (n)` suffix is added instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::ledger::{compute_checksum, Triage};

#[derive(Debug, thiserror::Error)]
pub enum RelocateError {
    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),
    #[error("output volume is full while writing {path}: {source}")]
    StorageFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("copy of {from} to {to} did not match the source")]
    Verify { from: PathBuf, to: PathBuf },
}

impl RelocateError {
    /// A full output volume stops the run; everything else is per file
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }

    pub(crate) fn io(path: &Path, from: &Path, to: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::StorageFull {
            Self::StorageFull {
                path: path.to_path_buf(),
                source,
            }
        } else {
            Self::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            }
        }
    }
}

/// Moves one file to a free destination whose parent exists
pub type MoveFn = fn(&Path, &Path) -> Result<(), RelocateError>;

/// Where a file went, or would go in a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub destination: PathBuf,
    pub moved: bool,
}

#[derive(Debug, Clone)]
pub struct Relocator {
    output_base: PathBuf,
    dry_run: bool,
    mover: MoveFn,
}

impl Relocator {
    pub fn new(output_base: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            output_base: output_base.into(),
            dry_run,
            mover: move_file,
        }
    }

    /// Replace the rename / copy step
    pub fn with_mover(mut self, mover: MoveFn) -> Self {
        self.mover = mover;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Target path before collision handling
    pub fn destination_for(&self, category: Triage, relative: &Path) -> PathBuf {
        self.output_base.join(category.as_str()).join(relative)
    }

    /// Move `source` into the category subtree
    pub fn relocate(
        &self,
        source: &Path,
        category: Triage,
        relative: &Path,
    ) -> Result<Relocation, RelocateError> {
        if !source.is_file() {
            return Err(RelocateError::SourceMissing(source.to_path_buf()));
        }

        let target = self.destination_for(category, relative);
        if target == source {
            return Ok(Relocation {
                destination: target,
                moved: !self.dry_run,
            });
        }

        let destination = unique_destination(&target);

        if self.dry_run {
            tracing::info!(
                path = %source.display(),
                "[dry-run] would move to {}",
                destination.display()
            );
            return Ok(Relocation {
                destination,
                moved: false,
            });
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| {
                if source.kind() == io::ErrorKind::StorageFull {
                    RelocateError::StorageFull {
                        path: parent.to_path_buf(),
                        source,
                    }
                } else {
                    RelocateError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    }
                }
            })?;
        }

        (self.mover)(source, &destination)?;
        tracing::info!(path = %source.display(), "Moved to {}", destination.display());

        Ok(Relocation {
            destination,
            moved: true,
        })
    }
}

/// First free path among `name.ext`, `name (1).ext`, `name (2).ext`, ...
pub fn unique_destination(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let parent = target.parent().unwrap_or(Path::new("."));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = parent.join(format!("{} ({}){}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, falling back to copy + verify + delete across volumes
pub fn move_file(source: &Path, destination: &Path) -> Result<(), RelocateError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::StorageFull => {
            Err(RelocateError::io(destination, source, destination, e))
        }
        Err(e) => {
            tracing::debug!(
                path = %source.display(),
                "Rename failed ({}), copying instead",
                e
            );
            copy_verify_delete(source, destination)
        }
    }
}

fn copy_verify_delete(source: &Path, destination: &Path) -> Result<(), RelocateError> {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let staging = destination.with_file_name(format!(".{}.part", file_name));

    let cleanup = |e: RelocateError| {
        let _ = fs::remove_file(&staging);
        e
    };

    fs::copy(source, &staging)
        .map_err(|e| cleanup(RelocateError::io(&staging, source, destination, e)))?;

    let original = compute_checksum(source)
        .map_err(|e| cleanup(RelocateError::io(source, source, destination, e)))?;
    let copied = compute_checksum(&staging)
        .map_err(|e| cleanup(RelocateError::io(&staging, source, destination, e)))?;
    if original != copied {
        return Err(cleanup(RelocateError::Verify {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
        }));
    }

    fs::rename(&staging, destination)
        .map_err(|e| cleanup(RelocateError::io(destination, source, destination, e)))?;

    // Leaving both copies behind would break at-most-once relocation
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(RelocateError::io(source, source, destination, e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_relocate_preserves_relative_path() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = src.path().join("docs/2024/report.pdf");
        write(&file, "report");

        let relocator = Relocator::new(out.path(), false);
        let result = relocator
            .relocate(&file, Triage::Evergreen, Path::new("docs/2024/report.pdf"))
            .unwrap();

        assert!(result.moved);
        assert_eq!(result.destination, out.path().join("evergreen/docs/2024/report.pdf"));
        assert!(!file.exists());
        assert_eq!(fs::read_to_string(&result.destination).unwrap(), "report");
    }

    #[test]
    fn test_no_silent_overwrite() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let relocator = Relocator::new(out.path(), false);

        let first = src.path().join("a/note.txt");
        let second = src.path().join("b/note.txt");
        let third = src.path().join("c/note.txt");
        write(&first, "first");
        write(&second, "second");
        write(&third, "third");

        let rel = Path::new("note.txt");
        let d1 = relocator.relocate(&first, Triage::Temporal, rel).unwrap().destination;
        let d2 = relocator.relocate(&second, Triage::Temporal, rel).unwrap().destination;
        let d3 = relocator.relocate(&third, Triage::Temporal, rel).unwrap().destination;

        assert_eq!(d1, out.path().join("temporal/note.txt"));
        assert_eq!(d2, out.path().join("temporal/note (1).txt"));
        assert_eq!(d3, out.path().join("temporal/note (2).txt"));
        assert_eq!(fs::read_to_string(d1).unwrap(), "first");
        assert_eq!(fs::read_to_string(d2).unwrap(), "second");
        assert_eq!(fs::read_to_string(d3).unwrap(), "third");
    }

    #[test]
    fn test_dry_run_leaves_file() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = src.path().join("x.md");
        write(&file, "x");

        let relocator = Relocator::new(out.path(), true);
        let result = relocator.relocate(&file, Triage::Unknown, Path::new("x.md")).unwrap();

        assert!(!result.moved);
        assert_eq!(result.destination, out.path().join("unknown/x.md"));
        assert!(file.exists());
        assert!(!out.path().join("unknown").exists());
    }

    #[test]
    fn test_missing_source() {
        let out = TempDir::new().unwrap();
        let relocator = Relocator::new(out.path(), false);
        let err = relocator
            .relocate(&out.path().join("gone.txt"), Triage::Unknown, Path::new("gone.txt"))
            .unwrap_err();
        assert!(matches!(err, RelocateError::SourceMissing(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_storage_full_is_fatal() {
        let p = Path::new("out/a.txt");
        let full = RelocateError::io(p, p, p, io::Error::from(io::ErrorKind::StorageFull));
        assert!(matches!(full, RelocateError::StorageFull { .. }));
        assert!(full.is_fatal());

        let denied = RelocateError::io(p, p, p, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, RelocateError::Move { .. }));
        assert!(!denied.is_fatal());
    }

    #[test]
    fn test_mover_error_leaves_source() {
        fn full_disk(_: &Path, destination: &Path) -> Result<(), RelocateError> {
            Err(RelocateError::io(
                destination,
                destination,
                destination,
                io::Error::from(io::ErrorKind::StorageFull),
            ))
        }

        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = src.path().join("big.pdf");
        write(&file, "big");

        let relocator = Relocator::new(out.path(), false).with_mover(full_disk);
        let err = relocator
            .relocate(&file, Triage::Temporal, Path::new("big.pdf"))
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(file.exists());
        assert!(!out.path().join("temporal/big.pdf").exists());
    }

    #[test]
    fn test_unique_destination_without_extension() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("README");
        write(&target, "x");
        assert_eq!(unique_destination(&target), dir.path().join("README (1)"));
    }

    #[test]
    fn test_copy_verify_delete() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in.bin");
        let destination = dir.path().join("out/in.bin");
        write(&source, "payload");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();

        copy_verify_delete(&source, &destination).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "payload");
        assert!(!dir.path().join("out/.in.bin.part").exists());
    }
}

//! SHA-256 content checksums used as the ledger key.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (64KB)
const BUFFER_SIZE: usize = 65536;

/// Content hash plus the byte size observed while hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub sha256: String,
    pub size: u64,
}

/// Compute the SHA-256 checksum of a file's content.
///
/// Directories are rejected; a missing file surfaces as `ErrorKind::NotFound`
/// so callers can tell a vanished file apart from an unreadable one.
pub fn compute_checksum(path: &Path) -> std::io::Result<FileDigest> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is a directory", path.display()),
        ));
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        size += bytes_read as u64;
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_compute_checksum_known_value() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        File::create(&file_path)
            .unwrap()
            .write_all(b"Hello, World!")
            .unwrap();

        let digest = compute_checksum(&file_path).unwrap();

        assert_eq!(
            digest.sha256,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(digest.size, 13);
    }

    #[test]
    fn test_same_content_same_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.md");
        let b = temp_dir.path().join("nested-b.md");
        std::fs::write(&a, "same bytes").unwrap();
        std::fs::write(&b, "same bytes").unwrap();

        assert_eq!(
            compute_checksum(&a).unwrap().sha256,
            compute_checksum(&b).unwrap().sha256
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = compute_checksum(&temp_dir.path().join("gone.pdf")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_directory_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(compute_checksum(temp_dir.path()).is_err());
    }
}

//! Content and metadata checksums.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::document::{FileStat, timestamp_nanos};
use crate::error::{FiledexError, Result};

/// Prefix of checksums derived from metadata instead of content.
pub const METADATA_CHECKSUM_PREFIX: &str = "meta:";

/// Prefix marking a document whose extraction or hashing failed. Such a
/// document is ingested again on every update until it succeeds.
pub const FAILED_CHECKSUM_PREFIX: &str = "failed:";

/// Hex SHA-256 of a file's bytes.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| FiledexError::checksum(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| FiledexError::checksum(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Checksum standing in for content that is never read (oversized files,
/// unreadable files).
pub fn metadata_checksum(stat: &FileStat) -> String {
    format!(
        "{METADATA_CHECKSUM_PREFIX}{}:{}",
        stat.size,
        timestamp_nanos(&stat.modified)
    )
}

pub fn is_metadata_checksum(checksum: &str) -> bool {
    checksum.starts_with(METADATA_CHECKSUM_PREFIX)
}

pub fn failed_checksum(checksum: &str) -> String {
    format!("{FAILED_CHECKSUM_PREFIX}{checksum}")
}

pub fn is_failed_checksum(checksum: &str) -> bool {
    checksum.starts_with(FAILED_CHECKSUM_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_checksum(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_file_is_checksum_error() {
        let err = file_checksum(Path::new("/nonexistent/filedex/x")).unwrap_err();
        assert!(matches!(err, FiledexError::Checksum { .. }));
    }

    #[test]
    fn test_metadata_checksum() {
        let stat = FileStat {
            path: "/big.iso".into(),
            size: 7,
            modified: DateTime::from_timestamp(1, 5).unwrap(),
            created: DateTime::from_timestamp(1, 5).unwrap(),
        };
        let checksum = metadata_checksum(&stat);
        assert_eq!(checksum, "meta:7:1000000005");
        assert!(is_metadata_checksum(&checksum));

        let failed = failed_checksum(&checksum);
        assert_eq!(failed, "failed:meta:7:1000000005");
        assert!(is_failed_checksum(&failed));
        assert!(!is_metadata_checksum(&failed));
        assert!(!is_failed_checksum(&checksum));
    }
}

//! Indexed document model.
//!
//! A [`Document`] is one indexed file: its metadata, the plain text extracted
//! from it and the checksum of its raw bytes. The ingestion pipeline turns a
//! file into an [`AnalyzedDocument`], which additionally carries the terms and
//! positions that end up in a segment's postings.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a committed document. Ids are allocated by the store in
/// strictly increasing order and never reused.
pub type DocId = u64;

/// Number of characters of extracted text kept in the segment for display.
pub const STORED_CONTENT_CHARS: usize = 1000;

/// The indexed text fields of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// Tokens of the file name.
    Filename,
    /// Tokens of the extracted content.
    Content,
}

impl Field {
    /// Both fields, in on-disk order.
    pub const ALL: [Field; 2] = [Field::Filename, Field::Content];

    pub fn as_u8(self) -> u8 {
        match self {
            Field::Filename => 0,
            Field::Content => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Field> {
        match value {
            0 => Some(Field::Filename),
            1 => Some(Field::Content),
            _ => None,
        }
    }

    /// Ranking weight of a match in this field.
    pub fn weight(self) -> f32 {
        match self {
            Field::Filename => 3.0,
            Field::Content => 1.0,
        }
    }
}

/// Filesystem metadata observed for a path during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl FileStat {
    /// Build a stat from already-fetched metadata.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        // Not every platform/filesystem records a birth time.
        let created = metadata.created().unwrap_or(modified);
        FileStat {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
            created: DateTime::<Utc>::from(created),
        }
    }

    /// Stat a path, following no symlinks.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::symlink_metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Cheap change fingerprint: size plus modification time.
    pub fn fingerprint(&self) -> (u64, i64) {
        (self.size, timestamp_nanos(&self.modified))
    }
}

/// One indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned id (0 until committed).
    pub id: DocId,

    /// Absolute path, the unique key.
    pub path: String,

    /// Final path component.
    pub filename: String,

    /// Lower-cased extension without the leading dot (empty if none).
    pub extension: String,

    /// Size in bytes.
    pub size: u64,

    pub modified: DateTime<Utc>,

    pub created: DateTime<Utc>,

    /// Extracted plain text. Committed documents keep only the first
    /// [`STORED_CONTENT_CHARS`] characters; postings cover the full text.
    pub content: String,

    /// Hex SHA-256 of the raw bytes, or a `meta:` fingerprint for files
    /// indexed metadata-only because of their size.
    pub checksum: String,

    /// When this version of the document was committed.
    pub indexed_at: DateTime<Utc>,
}

impl Document {
    /// Create a metadata-only document from a stat.
    pub fn from_stat(stat: &FileStat) -> Self {
        let path = stat.path.to_string_lossy().into_owned();
        let filename = stat
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let extension = normalize_extension(&stat.path);

        Document {
            id: 0,
            path,
            filename,
            extension,
            size: stat.size,
            modified: stat.modified,
            created: stat.created,
            content: String::new(),
            checksum: String::new(),
            indexed_at: Utc::now(),
        }
    }

    /// Cheap change fingerprint: size plus modification time.
    pub fn fingerprint(&self) -> (u64, i64) {
        (self.size, timestamp_nanos(&self.modified))
    }

    /// A short excerpt of the content: at most `max_lines` lines and
    /// `max_chars` characters.
    pub fn preview(&self, max_lines: usize, max_chars: usize) -> String {
        let mut preview = String::new();
        let mut used = 0usize;
        for line in self.content.lines().take(max_lines) {
            let len = line.chars().count();
            if used + len > max_chars {
                let remaining = max_chars.saturating_sub(used);
                if remaining > 3 {
                    if !preview.is_empty() {
                        preview.push('\n');
                    }
                    preview.extend(line.chars().take(remaining));
                    preview.push_str("...");
                }
                break;
            }
            if !preview.is_empty() {
                preview.push('\n');
            }
            preview.push_str(line);
            used += len + 1;
        }
        preview
    }
}

/// Positions of one term within one field of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub term: String,
    pub field: Field,
    /// Token positions, ascending.
    pub positions: Vec<u32>,
}

/// A document ready to be committed: metadata, full content and its terms.
///
/// Committing it supersedes any live document with the same path.
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub document: Document,
    pub terms: Vec<TermEntry>,
}

/// Lower-cased extension of a path without the dot.
pub fn normalize_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Nanoseconds since the epoch, saturating for out-of-range dates.
pub fn timestamp_nanos(time: &DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or_else(|| {
        if time.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

/// Truncate text to the first `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(path: &str) -> FileStat {
        FileStat {
            path: PathBuf::from(path),
            size: 42,
            modified: DateTime::from_timestamp(1_700_000_000, 5).unwrap(),
            created: DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_document_from_stat() {
        let doc = Document::from_stat(&stat("/data/Report_2024.DOCX"));
        assert_eq!(doc.filename, "Report_2024.DOCX");
        assert_eq!(doc.extension, "docx");
        assert_eq!(doc.size, 42);
        assert!(doc.content.is_empty());
        assert_eq!(doc.fingerprint(), stat("/x").fingerprint());
    }

    #[test]
    fn test_preview_truncates() {
        let mut doc = Document::from_stat(&stat("/a.txt"));
        doc.content = "first line\nsecond line\nthird".to_string();
        assert_eq!(doc.preview(2, 200), "first line\nsecond line");
        assert_eq!(doc.preview(5, 15), "first line\nsecon...");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_field_codes() {
        for field in Field::ALL {
            assert_eq!(Field::from_u8(field.as_u8()), Some(field));
        }
        assert!(Field::Filename.weight() > Field::Content.weight());
    }
}

//! The manifest: the single source of truth for what queries can see.
//!
//! File layout: `magic u32 | version u32 | payload (length-prefixed bincode) |
//! crc32 u32`. A new manifest is written to `MANIFEST.tmp`, synced and then
//! renamed over `MANIFEST`, so readers observe either the old or the new
//! manifest and never a mix.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::DocId;
use crate::error::{FiledexError, Result};
use crate::store::codec::{StructReader, StructWriter, verify_trailer};
use crate::store::segment::SegmentMeta;

pub const MANIFEST_FILE: &str = "MANIFEST";
pub const MANIFEST_TMP_FILE: &str = "MANIFEST.tmp";

const MANIFEST_MAGIC: u32 = 0x4644_584D; // "FDXM"
const MANIFEST_VERSION: u32 = 1;

/// Live segments and tombstones of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Incremented by every commit, compaction and clear.
    pub generation: u64,

    /// Id given to the next segment written.
    pub next_segment_id: u64,

    /// Id given to the next document committed. Ids start at 1.
    pub next_doc_id: DocId,

    /// Live segments in commit order.
    pub segments: Vec<SegmentMeta>,

    /// Deleted document ids still physically present in some segment.
    pub tombstones: BTreeSet<DocId>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            generation: 0,
            next_segment_id: 1,
            next_doc_id: 1,
            segments: Vec::new(),
            tombstones: BTreeSet::new(),
        }
    }
}

impl Manifest {
    /// Total documents stored in live segments, tombstoned ones included.
    pub fn stored_documents(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count).sum()
    }

    /// Documents visible to queries.
    pub fn live_documents(&self) -> u64 {
        self.stored_documents()
            .saturating_sub(self.tombstones.len() as u64)
    }

    /// Bytes occupied by live segment files.
    pub fn byte_size(&self) -> u64 {
        self.segments.iter().map(|s| s.byte_size).sum()
    }

    /// Tombstones per live document.
    pub fn deletion_ratio(&self) -> f64 {
        let tombstones = self.tombstones.len() as f64;
        if tombstones == 0.0 {
            return 0.0;
        }
        let live = self.live_documents();
        if live == 0 {
            f64::INFINITY
        } else {
            tombstones / live as f64
        }
    }

    pub fn references(&self, segment_id: u64) -> bool {
        self.segments.iter().any(|s| s.id == segment_id)
    }

    /// Load the manifest from `dir`. `Ok(None)` means no index exists yet;
    /// an unreadable or damaged manifest is [`FiledexError::CorruptIndex`].
    pub fn load(dir: &Path) -> Result<Option<Manifest>> {
        let path = dir.join(MANIFEST_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(FiledexError::corrupt(format!(
                    "manifest {} unreadable: {e}",
                    path.display()
                )));
            }
        };

        Self::decode(&data)
            .map(Some)
            .map_err(|e| FiledexError::corrupt(format!("manifest {}: {e}", path.display())))
    }

    fn decode(data: &[u8]) -> Result<Manifest> {
        let body = verify_trailer(data)?;
        let mut reader = StructReader::new(body);
        let magic = reader.read_u32()?;
        if magic != MANIFEST_MAGIC {
            return Err(FiledexError::corrupt(format!("bad magic {magic:08x}")));
        }
        let version = reader.read_u32()?;
        if version != MANIFEST_VERSION {
            return Err(FiledexError::corrupt(format!(
                "unsupported manifest version {version}"
            )));
        }
        let payload = reader.read_bytes()?;
        Ok(bincode::deserialize(payload)?)
    }

    /// Atomically replace the manifest in `dir` with this one.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let tmp = dir.join(MANIFEST_TMP_FILE);
        let payload = bincode::serialize(self)?;

        let file = File::create(&tmp)?;
        let mut writer = StructWriter::new(BufWriter::new(file));
        writer.write_u32(MANIFEST_MAGIC)?;
        writer.write_u32(MANIFEST_VERSION)?;
        writer.write_bytes(&payload)?;
        let file = writer
            .finish()?
            .into_inner()
            .map_err(|e| FiledexError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
        sync_dir(dir);
        Ok(())
    }
}

/// Persist a rename on filesystems that need the directory synced.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        if let Err(e) = handle.sync_all() {
            log::debug!("directory sync of {} failed: {e}", dir.display());
        }
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Manifest {
        Manifest {
            generation: 4,
            next_segment_id: 3,
            next_doc_id: 11,
            segments: vec![
                SegmentMeta { id: 1, doc_count: 6, byte_size: 600 },
                SegmentMeta { id: 2, doc_count: 4, byte_size: 400 },
            ],
            tombstones: [2, 5].into_iter().collect(),
        }
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Manifest::load(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manifest = sample();
        manifest.save(dir.path()).unwrap();

        assert_eq!(Manifest::load(dir.path()).unwrap(), Some(manifest));
        assert!(!dir.path().join(MANIFEST_TMP_FILE).exists());
    }

    #[test]
    fn test_counts() {
        let manifest = sample();
        assert_eq!(manifest.stored_documents(), 10);
        assert_eq!(manifest.live_documents(), 8);
        assert_eq!(manifest.byte_size(), 1000);
        assert!((manifest.deletion_ratio() - 0.25).abs() < 1e-9);
        assert!(manifest.references(2));
        assert_eq!(Manifest::default().deletion_ratio(), 0.0);
    }

    #[test]
    fn test_damaged_manifest_is_corrupt() {
        let dir = TempDir::new().unwrap();
        sample().save(dir.path()).unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let mut data = fs::read(&path).unwrap();
        data.truncate(data.len() - 1);
        fs::write(&path, data).unwrap();

        assert!(matches!(
            Manifest::load(dir.path()),
            Err(FiledexError::CorruptIndex(_))
        ));
    }
}

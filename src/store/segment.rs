//! Immutable segment files.
//!
//! A segment holds a batch of documents and the postings of every term that
//! occurs in them. Layout (all integers little-endian, `v` = varint):
//!
//! ```text
//! magic u32 | version u8 | segment id u64
//! doc count v | documents...
//! term count v | (term string, postings length v, postings bytes)...
//! crc32 u32
//! ```
//!
//! Terms are written in sorted order. A term's postings are sorted by
//! document id then field; each posting is `doc delta v, field u8,
//! positions (count v, deltas v...)`.
//!
//! [`SegmentReader`] maps the file with `memmap2`, decodes the document
//! table and the term dictionary up front and decodes postings lazily.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::document::{DocId, Document, Field, TermEntry};
use crate::error::{FiledexError, Result};
use crate::store::codec::{StructReader, StructWriter, verify_trailer};

const SEGMENT_MAGIC: u32 = 0x4644_5853; // "FDXS"
const SEGMENT_VERSION: u8 = 1;

/// One (document, field) occurrence of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc: DocId,
    pub field: Field,
    pub positions: Vec<u32>,
}

impl Posting {
    /// Term frequency in this field.
    pub fn frequency(&self) -> usize {
        self.positions.len()
    }
}

/// Manifest entry describing a committed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: u64,
    pub doc_count: u64,
    pub byte_size: u64,
}

/// File name of a segment.
pub fn segment_file_name(id: u64) -> String {
    format!("seg_{id:010}.seg")
}

/// Parse a segment id from a file name produced by [`segment_file_name`].
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("seg_")?
        .strip_suffix(".seg")?
        .parse()
        .ok()
}

/// Accumulates documents and postings for one segment.
#[derive(Debug)]
pub struct SegmentBuilder {
    id: u64,
    documents: Vec<Document>,
    postings: AHashMap<String, Vec<Posting>>,
}

impl SegmentBuilder {
    pub fn new(id: u64) -> Self {
        SegmentBuilder {
            id,
            documents: Vec::new(),
            postings: AHashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Add a document that already carries its final id.
    pub fn add_document(&mut self, document: Document, terms: Vec<TermEntry>) {
        let doc = document.id;
        for entry in terms {
            self.postings.entry(entry.term).or_default().push(Posting {
                doc,
                field: entry.field,
                positions: entry.positions,
            });
        }
        self.documents.push(document);
    }

    /// Add a document without postings (used when merging, where postings
    /// arrive per term via [`SegmentBuilder::add_postings`]).
    pub fn add_stored(&mut self, document: Document) {
        self.documents.push(document);
    }

    pub fn add_postings(&mut self, term: &str, postings: impl IntoIterator<Item = Posting>) {
        match self.postings.get_mut(term) {
            Some(existing) => existing.extend(postings),
            None => {
                let list: Vec<Posting> = postings.into_iter().collect();
                if !list.is_empty() {
                    self.postings.insert(term.to_string(), list);
                }
            }
        }
    }

    /// Write the segment into `dir`, fsync it and return its manifest entry.
    pub fn write(mut self, dir: &Path) -> Result<SegmentMeta> {
        let path = dir.join(segment_file_name(self.id));
        self.documents.sort_by_key(|d| d.id);

        let file = File::create(&path)?;
        let mut writer = StructWriter::new(BufWriter::new(file));
        writer.write_u32(SEGMENT_MAGIC)?;
        writer.write_u8(SEGMENT_VERSION)?;
        writer.write_u64(self.id)?;

        writer.write_varint(self.documents.len() as u64)?;
        for document in &self.documents {
            write_document(&mut writer, document)?;
        }

        let mut terms: Vec<(String, Vec<Posting>)> = self.postings.into_iter().collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        writer.write_varint(terms.len() as u64)?;

        let mut scratch = Vec::new();
        for (term, mut postings) in terms {
            postings.sort_by(|a, b| (a.doc, a.field).cmp(&(b.doc, b.field)));
            scratch.clear();
            encode_postings(&mut scratch, &postings)?;
            writer.write_string(&term)?;
            writer.write_bytes(&scratch)?;
        }

        let buffered = writer.finish()?;
        let file = buffered
            .into_inner()
            .map_err(|e| FiledexError::Io(e.into_error()))?;
        file.sync_all()?;
        let byte_size = file.metadata()?.len();

        Ok(SegmentMeta {
            id: self.id,
            doc_count: self.documents.len() as u64,
            byte_size,
        })
    }
}

fn write_timestamp<W: std::io::Write>(
    writer: &mut StructWriter<W>,
    time: &DateTime<Utc>,
) -> Result<()> {
    writer.write_i64(time.timestamp())?;
    writer.write_u32(time.timestamp_subsec_nanos())
}

fn read_timestamp(reader: &mut StructReader<'_>) -> Result<DateTime<Utc>> {
    let secs = reader.read_i64()?;
    let nanos = reader.read_u32()?;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| FiledexError::corrupt(format!("timestamp {secs}.{nanos} out of range")))
}

fn write_document<W: std::io::Write>(
    writer: &mut StructWriter<W>,
    document: &Document,
) -> Result<()> {
    writer.write_u64(document.id)?;
    writer.write_string(&document.path)?;
    writer.write_string(&document.filename)?;
    writer.write_string(&document.extension)?;
    writer.write_u64(document.size)?;
    write_timestamp(writer, &document.modified)?;
    write_timestamp(writer, &document.created)?;
    write_timestamp(writer, &document.indexed_at)?;
    writer.write_string(&document.checksum)?;
    writer.write_string(&document.content)
}

fn read_document(reader: &mut StructReader<'_>) -> Result<Document> {
    Ok(Document {
        id: reader.read_u64()?,
        path: reader.read_string()?,
        filename: reader.read_string()?,
        extension: reader.read_string()?,
        size: reader.read_u64()?,
        modified: read_timestamp(reader)?,
        created: read_timestamp(reader)?,
        indexed_at: read_timestamp(reader)?,
        checksum: reader.read_string()?,
        content: reader.read_string()?,
    })
}

fn encode_postings(out: &mut Vec<u8>, postings: &[Posting]) -> Result<()> {
    let mut writer = StructWriter::new(out);
    writer.write_varint(postings.len() as u64)?;
    let mut previous = 0u64;
    for posting in postings {
        writer.write_varint(posting.doc - previous)?;
        writer.write_u8(posting.field.as_u8())?;
        writer.write_delta_compressed_u32s(&posting.positions)?;
        previous = posting.doc;
    }
    // The outer writer checksums these bytes; no trailer here.
    Ok(())
}

fn decode_postings(data: &[u8]) -> Result<Vec<Posting>> {
    let mut reader = StructReader::new(data);
    let count = reader.read_varint()? as usize;
    let mut postings = Vec::with_capacity(count.min(data.len()));
    let mut doc = 0u64;
    for _ in 0..count {
        doc += reader.read_varint()?;
        let code = reader.read_u8()?;
        let field = Field::from_u8(code)
            .ok_or_else(|| FiledexError::corrupt(format!("unknown field code {code}")))?;
        postings.push(Posting {
            doc,
            field,
            positions: reader.read_delta_compressed_u32s()?,
        });
    }
    Ok(postings)
}

/// Read access to one segment file.
#[derive(Debug)]
pub struct SegmentReader {
    id: u64,
    path: PathBuf,
    mmap: Mmap,
    documents: Vec<Document>,
    /// Term -> (offset, length) of its postings within the mapped file.
    dictionary: BTreeMap<String, (usize, usize)>,
}

impl SegmentReader {
    /// Map and validate a segment file. Any structural problem is reported
    /// as [`FiledexError::CorruptIndex`].
    pub fn open(dir: &Path, id: u64) -> Result<SegmentReader> {
        let path = dir.join(segment_file_name(id));
        let file = File::open(&path).map_err(|e| {
            FiledexError::corrupt(format!("segment {} unreadable: {e}", path.display()))
        })?;
        // SAFETY: segment files are immutable once referenced by the manifest
        // and are only deleted after being dropped from it.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            FiledexError::corrupt(format!("segment {} unmappable: {e}", path.display()))
        })?;

        let (documents, dictionary) = Self::parse(&mmap, id)
            .map_err(|e| FiledexError::corrupt(format!("segment {}: {e}", path.display())))?;

        Ok(SegmentReader {
            id,
            path,
            mmap,
            documents,
            dictionary,
        })
    }

    #[allow(clippy::type_complexity)]
    fn parse(
        data: &[u8],
        expected_id: u64,
    ) -> Result<(Vec<Document>, BTreeMap<String, (usize, usize)>)> {
        let body = verify_trailer(data)?;
        let mut reader = StructReader::new(body);

        let magic = reader.read_u32()?;
        if magic != SEGMENT_MAGIC {
            return Err(FiledexError::corrupt(format!("bad magic {magic:08x}")));
        }
        let version = reader.read_u8()?;
        if version != SEGMENT_VERSION {
            return Err(FiledexError::corrupt(format!(
                "unsupported segment version {version}"
            )));
        }
        let id = reader.read_u64()?;
        if id != expected_id {
            return Err(FiledexError::corrupt(format!(
                "segment id {id} does not match file name id {expected_id}"
            )));
        }

        let doc_count = reader.read_varint()? as usize;
        let mut documents = Vec::with_capacity(doc_count.min(body.len()));
        for _ in 0..doc_count {
            documents.push(read_document(&mut reader)?);
        }

        let term_count = reader.read_varint()? as usize;
        let mut dictionary = BTreeMap::new();
        for _ in 0..term_count {
            let term = reader.read_string()?;
            let len = reader.read_varint()? as usize;
            let offset = reader.position();
            reader.skip(len)?;
            dictionary.insert(term, (offset, len));
        }

        Ok((documents, dictionary))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the segment file in bytes.
    pub fn byte_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Stored documents, sorted by id (tombstoned ones included).
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.documents
            .binary_search_by_key(&id, |d| d.id)
            .ok()
            .map(|idx| &self.documents[idx])
    }

    pub fn term_count(&self) -> usize {
        self.dictionary.len()
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.dictionary.contains_key(term)
    }

    /// All terms, in sorted order.
    pub fn terms(&self) -> impl Iterator<Item = &str> + '_ {
        self.dictionary.keys().map(String::as_str)
    }

    /// Terms starting with `prefix`, in sorted order.
    pub fn terms_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.dictionary
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(term, _)| term.as_str())
            .take_while(move |term| term.starts_with(prefix))
    }

    /// Decode the postings of a term (empty if absent).
    pub fn postings(&self, term: &str) -> Result<Vec<Posting>> {
        match self.dictionary.get(term) {
            Some(&(offset, len)) => decode_postings(&self.mmap[offset..offset + len]),
            None => Ok(Vec::new()),
        }
    }
}

/// Delete a segment file, ignoring files that are already gone.
pub fn remove_segment_file(dir: &Path, id: u64) -> Result<()> {
    match fs::remove_file(dir.join(segment_file_name(id))) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

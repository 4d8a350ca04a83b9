//! Sealed segment read-back.
//!
//! [`SegmentReader`] memory-maps a sealed segment directory and serves
//! lookups directly from the mappings. All files are validated once at
//! open; after that, term and key lookups touch only the pages they
//! traverse. Readers hold no locks and never mutate the segment, so any
//! number of them can share a directory.

use std::fs::{self, File};
use std::path::Path;

use ahash::AHashMap;
use memmap2::Mmap;
use roaring::RoaringBitmap;

use crate::codec::{Decoder, HEADER_LEN, SegmentFileKind};
use crate::error::{CalamusError, Result};
use crate::event::Event;
use crate::index::btrie::BTrieReader;
use crate::index::skipindex::{KeyEncoding, SkipIndexReader};
use crate::schema::{FieldInfo, FieldType, IndexInfo};
use crate::segment::info::SegmentInfo;
use crate::segment::rows::RowStoreReader;
use crate::segment::{INFO_FILE, POSTING_FILE, ROW_INDEX_FILE, ROWS_FILE, field_index_file};

/// Read-only view of one sealed segment.
pub struct SegmentReader {
    info: SegmentInfo,
    posting: Mmap,
    rows: Mmap,
    row_index: Mmap,
    field_indexes: AHashMap<u32, Mmap>,
    min_timestamp: u64,
    max_timestamp: u64,
}

impl SegmentReader {
    /// Open the segment directory at `dir`, validating every file.
    pub fn open(dir: &Path) -> Result<Self> {
        let info_buf = fs::read(dir.join(INFO_FILE))?;
        let info = SegmentInfo::read(&info_buf)?;

        let posting = map_file(&dir.join(POSTING_FILE))?;
        let kind = Decoder::new(&posting).read_header()?;
        if kind != SegmentFileKind::PostingList {
            return Err(CalamusError::format(format!(
                "expected PostingList file, found {kind:?}"
            )));
        }

        let rows = map_file(&dir.join(ROWS_FILE))?;
        let (min_timestamp, max_timestamp) = {
            let stats = RowStoreReader::open(&rows)?;
            if stats.count() != info.event_count() {
                return Err(CalamusError::format(format!(
                    "row store holds {} events, segment metadata says {}",
                    stats.count(),
                    info.event_count()
                )));
            }
            (stats.min_timestamp(), stats.max_timestamp())
        };

        let row_index = map_file(&dir.join(ROW_INDEX_FILE))?;
        SkipIndexReader::open(
            &row_index,
            SegmentFileKind::RowIndex,
            KeyEncoding::Unsigned,
        )?;

        // A missing index file means the field saw no values
        let mut field_indexes = AHashMap::new();
        for field in info.schema().fields() {
            if !field.indexed {
                continue;
            }
            let path = dir.join(field_index_file(&field.name));
            if !path.exists() {
                continue;
            }
            let map = map_file(&path)?;
            match field.field_type {
                FieldType::Text | FieldType::Keyword => {
                    BTrieReader::open(&map)?;
                }
                FieldType::Int | FieldType::Timestamp | FieldType::Float => {
                    SkipIndexReader::open(
                        &map,
                        SegmentFileKind::SkipIndex,
                        field_encoding(field.field_type),
                    )?;
                }
            }
            field_indexes.insert(field.id, map);
        }

        Ok(SegmentReader {
            info,
            posting,
            rows,
            row_index,
            field_indexes,
            min_timestamp,
            max_timestamp,
        })
    }

    /// Schema the segment was sealed against.
    pub fn schema(&self) -> &IndexInfo {
        self.info.schema()
    }

    /// Number of events in the segment.
    pub fn event_count(&self) -> u64 {
        self.info.event_count()
    }

    /// Smallest timestamp in the segment, or zero if none was stored.
    pub fn min_timestamp(&self) -> u64 {
        self.min_timestamp
    }

    /// Largest timestamp in the segment, or zero if none was stored.
    pub fn max_timestamp(&self) -> u64 {
        self.max_timestamp
    }

    /// Event ids matching `term` in a string field, or `None` if the
    /// term does not occur.
    pub fn term_postings(&self, field: &str, term: &str) -> Result<Option<RoaringBitmap>> {
        let field = self.indexed_field(field, &[FieldType::Text, FieldType::Keyword])?;
        let Some(buf) = self.field_indexes.get(&field.id) else {
            return Ok(None);
        };
        let trie = BTrieReader::open(buf)?;
        match trie.lookup(term)? {
            Some(offset) => Ok(Some(self.posting_at(offset)?)),
            None => Ok(None),
        }
    }

    /// Smallest key in an integer or timestamp field that is greater
    /// than or equal to `key`, with its event ids.
    pub fn seek_unsigned(&self, field: &str, key: u64) -> Result<Option<(u64, RoaringBitmap)>> {
        let field = self.indexed_field(field, &[FieldType::Int, FieldType::Timestamp])?;
        let Some(buf) = self.field_indexes.get(&field.id) else {
            return Ok(None);
        };
        let index = SkipIndexReader::open(buf, SegmentFileKind::SkipIndex, KeyEncoding::Unsigned)?;
        match index.seek(key)? {
            Some((found, offset)) => Ok(Some((found, self.posting_at(offset)?))),
            None => Ok(None),
        }
    }

    /// Smallest key in a float field that is greater than or equal to
    /// `key`, with its event ids.
    pub fn seek_float(&self, field: &str, key: f64) -> Result<Option<(f64, RoaringBitmap)>> {
        let field = self.indexed_field(field, &[FieldType::Float])?;
        let Some(buf) = self.field_indexes.get(&field.id) else {
            return Ok(None);
        };
        let index = SkipIndexReader::open(buf, SegmentFileKind::SkipIndex, KeyEncoding::Float)?;
        match index.seek(key.to_bits())? {
            Some((found, offset)) => Ok(Some((f64::from_bits(found), self.posting_at(offset)?))),
            None => Ok(None),
        }
    }

    /// Fetch the stored event with the given id, or `None` if the id
    /// was never assigned.
    pub fn event(&self, event_id: u32) -> Result<Option<Event>> {
        let index = SkipIndexReader::open(
            &self.row_index,
            SegmentFileKind::RowIndex,
            KeyEncoding::Unsigned,
        )?;
        let Some(offset) = index.get(event_id as u64)? else {
            return Ok(None);
        };
        let rows = RowStoreReader::open(&self.rows)?;
        Ok(Some(rows.read_event(offset, self.info.schema())?))
    }

    fn indexed_field(&self, name: &str, accepted: &[FieldType]) -> Result<&FieldInfo> {
        let field = self.info.schema().field(name).ok_or_else(|| {
            CalamusError::schema(format!(
                "no field '{name}' in index '{}'",
                self.info.schema().name()
            ))
        })?;
        if !field.indexed {
            return Err(CalamusError::schema(format!(
                "field '{name}' is not indexed"
            )));
        }
        if !accepted.contains(&field.field_type) {
            return Err(CalamusError::schema(format!(
                "field '{name}' has type {}, not queryable this way",
                field.field_type.as_str()
            )));
        }
        Ok(field)
    }

    /// Decode the posting list bitmap starting at `offset`.
    fn posting_at(&self, offset: u64) -> Result<RoaringBitmap> {
        let buf: &[u8] = &self.posting;
        if offset < HEADER_LEN as u64 || offset >= buf.len() as u64 {
            return Err(CalamusError::format(format!(
                "posting offset {offset} out of range"
            )));
        }
        Ok(RoaringBitmap::deserialize_from(&buf[offset as usize..])?)
    }
}

fn field_encoding(field_type: FieldType) -> KeyEncoding {
    match field_type {
        FieldType::Float => KeyEncoding::Float,
        _ => KeyEncoding::Unsigned,
    }
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // Safety: segment files are immutable after the directory rename,
    // so the mapping is never written to underneath us
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

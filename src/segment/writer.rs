//! Segment sealing.
//!
//! [`SegmentWriter`] turns a buffered [`Segment`] into an immutable
//! directory of files. Sealing runs in two stages:
//!
//! 1. Build. Every event is walked once against the schema. Indexed
//!    string fields feed a burst trie, indexed numeric fields a skip
//!    list, and each distinct term or key claims one posting list in a
//!    shared store.
//! 2. Flush. The posting file is written first, which assigns every
//!    posting list its final offset. The per-field index files are
//!    written after it and embed those offsets, followed by the row
//!    store, the row index, and the metadata file.
//!
//! Files are staged in a `<id>.tmp` directory and renamed into place
//! only after every file has been synced. A crash mid-seal leaves at
//! most a stale `.tmp` directory, never a half-written segment under
//! the final name.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info};

use crate::codec::{Encoder, SegmentFileKind};
use crate::error::{CalamusError, Result};
use crate::event::Value;
use crate::index::btrie::BTrie;
use crate::index::skipindex::{KeyEncoding, write_skip_index};
use crate::index::skiplist::{SkipKey, SkipList};
use crate::postings::{PostingId, PostingStore};
use crate::schema::FieldType;
use crate::segment::info::SegmentInfo;
use crate::segment::rows::RowStoreWriter;
use crate::segment::{
    INFO_FILE, POSTING_FILE, ROW_INDEX_FILE, ROWS_FILE, Segment, field_index_file,
};
use crate::tokenizer::{LogTokenizer, Tokenizer};

/// Segment writer configuration.
#[derive(Clone)]
pub struct SegmentWriterConfig {
    /// Skip index sampling interval: every `ixl`-th entry of a level is
    /// promoted to the level above. Must be at least 2.
    pub ixl: usize,

    /// Burst trie bucket capacity for string field indexes.
    pub bucket_capacity: usize,

    /// Tokenizer applied to text field values.
    pub tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for SegmentWriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriterConfig")
            .field("ixl", &self.ixl)
            .field("bucket_capacity", &self.bucket_capacity)
            .field("tokenizer", &self.tokenizer.name())
            .finish()
    }
}

impl Default for SegmentWriterConfig {
    fn default() -> Self {
        SegmentWriterConfig {
            ixl: 64,
            bucket_capacity: 64,
            tokenizer: Arc::new(LogTokenizer),
        }
    }
}

/// In-memory index under construction for one field.
enum FieldIndex {
    Trie(BTrie),
    Unsigned(SkipList<u64, PostingId>),
    Float(SkipList<f64, PostingId>),
}

impl FieldIndex {
    fn for_type(field_type: FieldType, bucket_capacity: usize) -> Self {
        match field_type {
            FieldType::Text | FieldType::Keyword => {
                FieldIndex::Trie(BTrie::with_bucket_capacity(bucket_capacity))
            }
            FieldType::Int | FieldType::Timestamp => FieldIndex::Unsigned(SkipList::new()),
            FieldType::Float => FieldIndex::Float(SkipList::new()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            FieldIndex::Trie(trie) => trie.is_empty(),
            FieldIndex::Unsigned(list) => list.is_empty(),
            FieldIndex::Float(list) => list.is_empty(),
        }
    }
}

/// Writes a [`Segment`] out as an immutable directory.
#[derive(Debug, Default)]
pub struct SegmentWriter {
    config: SegmentWriterConfig,
}

impl SegmentWriter {
    /// Create a writer with the given configuration.
    pub fn new(config: SegmentWriterConfig) -> Self {
        SegmentWriter { config }
    }

    /// Seal `segment` under `dir` and return the segment directory path.
    ///
    /// The directory is named after the segment id and appears
    /// atomically: readers either see the complete segment or nothing.
    pub fn write(&self, segment: &Segment, dir: &Path) -> Result<PathBuf> {
        let (mut store, indexes) = self.build_field_indexes(segment)?;
        debug!(
            "segment {}: built {} field indexes over {} posting lists",
            segment.id(),
            indexes.len(),
            store.len()
        );

        let final_dir = dir.join(segment.id().to_string());
        let tmp_dir = dir.join(format!("{}.tmp", segment.id()));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        write_segment_file(&tmp_dir.join(POSTING_FILE), |enc| store.write_all(enc))?;
        self.write_field_indexes(&tmp_dir, segment, &indexes, &store)?;
        let row_offsets = write_row_store(&tmp_dir, segment)?;
        self.write_row_index(&tmp_dir, &row_offsets)?;
        write_segment_info(&tmp_dir, segment)?;

        fs::rename(&tmp_dir, &final_dir)?;
        sync_dir(dir)?;
        info!(
            "sealed segment {} with {} events at {}",
            segment.id(),
            segment.len(),
            final_dir.display()
        );
        Ok(final_dir)
    }

    /// Walk all events once, building one index per indexed field and
    /// one posting list per distinct term or key.
    fn build_field_indexes(
        &self,
        segment: &Segment,
    ) -> Result<(PostingStore, AHashMap<u32, FieldIndex>)> {
        let info = segment.info();
        let mut store = PostingStore::new();
        let mut indexes: AHashMap<u32, FieldIndex> = AHashMap::new();
        for field in info.fields() {
            if field.indexed {
                indexes.insert(
                    field.id,
                    FieldIndex::for_type(field.field_type, self.config.bucket_capacity),
                );
            }
        }

        for (event_id, event) in segment.events().iter().enumerate() {
            let event_id = event_id as u32;
            let mut matched = 0;
            for field in info.fields() {
                let Some(value) = event.get(&field.name) else {
                    continue;
                };
                matched += 1;
                if value.field_type() != field.field_type {
                    return Err(CalamusError::schema(format!(
                        "field '{}' expects {} values, event {} carries {}",
                        field.name,
                        field.field_type.as_str(),
                        event_id,
                        value.field_type().as_str()
                    )));
                }
                let Some(index) = indexes.get_mut(&field.id) else {
                    continue;
                };
                match (index, value) {
                    (FieldIndex::Trie(trie), Value::Text(text)) => {
                        for term in self.config.tokenizer.tokenize(text) {
                            trie.add(&term, event_id, &mut store);
                        }
                    }
                    (FieldIndex::Trie(trie), Value::Keyword(keyword)) => {
                        trie.add(keyword, event_id, &mut store);
                    }
                    (FieldIndex::Unsigned(list), Value::Int(v) | Value::Timestamp(v)) => {
                        // the maximum key of each domain closes on-disk
                        // index levels, so it cannot be a real key
                        if *v == u64::MAX {
                            return Err(CalamusError::schema(format!(
                                "field '{}' cannot index u64::MAX, event {}",
                                field.name, event_id
                            )));
                        }
                        add_key(list, *v, event_id, &mut store);
                    }
                    (FieldIndex::Float(list), Value::Float(v)) => {
                        if !v.is_finite() {
                            return Err(CalamusError::schema(format!(
                                "field '{}' cannot index non-finite value {}, event {}",
                                field.name, v, event_id
                            )));
                        }
                        add_key(list, *v, event_id, &mut store);
                    }
                    _ => {
                        return Err(CalamusError::internal(format!(
                            "index for field '{}' does not match its declared type",
                            field.name
                        )));
                    }
                }
            }
            if matched != event.len() {
                for name in event.field_names() {
                    if info.field(name).is_none() {
                        return Err(CalamusError::schema(format!(
                            "event {} field '{}' is not declared in index '{}'",
                            event_id,
                            name,
                            info.name()
                        )));
                    }
                }
            }
        }
        Ok((store, indexes))
    }

    /// Write one `<field>.idx` file per indexed field that saw at least
    /// one term or key. Requires the posting store to be flushed.
    fn write_field_indexes(
        &self,
        tmp_dir: &Path,
        segment: &Segment,
        indexes: &AHashMap<u32, FieldIndex>,
        store: &PostingStore,
    ) -> Result<()> {
        for field in segment.info().fields() {
            let Some(index) = indexes.get(&field.id) else {
                continue;
            };
            if index.is_empty() {
                continue;
            }
            let path = tmp_dir.join(field_index_file(&field.name));
            match index {
                FieldIndex::Trie(trie) => {
                    write_segment_file(&path, |enc| trie.write(enc, store))?;
                }
                FieldIndex::Unsigned(list) => {
                    let entries = skip_entries(list, store);
                    self.write_skip_file(&path, &entries, KeyEncoding::Unsigned)?;
                }
                FieldIndex::Float(list) => {
                    let entries = skip_entries(list, store);
                    self.write_skip_file(&path, &entries, KeyEncoding::Float)?;
                }
            }
            debug!("wrote field index {}", path.display());
        }
        Ok(())
    }

    /// Write the event id to row offset index. Event ids are dense, so
    /// the entry list is already sorted.
    fn write_row_index(&self, tmp_dir: &Path, row_offsets: &[u64]) -> Result<()> {
        let entries: Vec<(u64, u64)> = row_offsets
            .iter()
            .enumerate()
            .map(|(event_id, &offset)| (event_id as u64, offset))
            .collect();
        write_segment_file(&tmp_dir.join(ROW_INDEX_FILE), |enc| {
            enc.write_header(SegmentFileKind::RowIndex)?;
            write_skip_index(enc, &entries, self.config.ixl, KeyEncoding::Unsigned)
        })
    }

    fn write_skip_file(
        &self,
        path: &Path,
        entries: &[(u64, u64)],
        encoding: KeyEncoding,
    ) -> Result<()> {
        write_segment_file(path, |enc| {
            enc.write_header(SegmentFileKind::SkipIndex)?;
            write_skip_index(enc, entries, self.config.ixl, encoding)
        })
    }
}

/// Add `event_id` under `key`, allocating a posting list only for keys
/// seen for the first time.
fn add_key<K: SkipKey>(
    list: &mut SkipList<K, PostingId>,
    key: K,
    event_id: u32,
    store: &mut PostingStore,
) {
    match list.search(&key) {
        Some(&id) => store.add(id, event_id),
        None => {
            let id = store.allocate(event_id);
            list.insert(key, id);
        }
    }
}

/// Map skip list entries to (raw key, posting offset) pairs for the
/// on-disk index. The posting store must be flushed first.
fn skip_entries<K: SkipKey>(list: &SkipList<K, PostingId>, store: &PostingStore) -> Vec<(u64, u64)> {
    list.iter()
        .map(|(key, id)| (key.raw_bits(), store.offset_of(*id)))
        .collect()
}

fn write_row_store(tmp_dir: &Path, segment: &Segment) -> Result<Vec<u64>> {
    let mut writer = RowStoreWriter::new();
    write_segment_file(&tmp_dir.join(ROWS_FILE), |enc| {
        writer.write(enc, segment.events(), segment.info())
    })?;
    Ok(writer.offsets().to_vec())
}

fn write_segment_info(tmp_dir: &Path, segment: &Segment) -> Result<()> {
    let info = SegmentInfo::new(segment.info().clone(), segment.len() as u64);
    write_segment_file(&tmp_dir.join(INFO_FILE), |enc| info.write(enc))
}

/// Create `path`, run `write` against a buffered encoder, then flush
/// and sync so the data is durable before the directory rename.
fn write_segment_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut Encoder<BufWriter<File>>) -> Result<()>,
{
    let file = File::create(path)?;
    let mut enc = Encoder::new(BufWriter::new(file));
    write(&mut enc)?;
    enc.flush()?;
    let file = enc.into_inner().into_inner().map_err(|e| e.into_error())?;
    file.sync_data()?;
    Ok(())
}

fn sync_dir(path: &Path) -> Result<()> {
    File::open(path)?.sync_data()?;
    Ok(())
}

//! Burst trie over string terms.
//!
//! Terms are spread over trie nodes byte by byte, but cold paths stay
//! collapsed: each node holds a bounded bucket of (suffix, posting)
//! records, and only when a bucket overflows does the node burst, moving
//! the records that share the overflowing first byte into one new child.
//! Hot prefixes grow real trie structure while rare terms stay cheap.
//!
//! ## On-disk layout
//!
//! ```text
//! header   magic + type byte
//! node     [posting offset varuint, 0 = none]
//!          [child count varuint]([byte u8][child offset varuint])...
//!          [bucket count varuint]([suffix bytes][posting offset varuint])...
//! ...      children are written before their parent, so every child
//!          offset is known by the time the parent is encoded
//! trailer  [root offset fixed64]
//! ```
//!
//! Posting offsets are copied by value from the posting store, which
//! must be flushed first; writing a still-unflushed posting is an
//! internal error rather than a corrupt file.

use roaring::RoaringBitmap;
use std::io::Write;

use crate::codec::{Decoder, Encoder, HEADER_LEN, SegmentFileKind};
use crate::error::{CalamusError, Result};
use crate::postings::{PostingId, PostingStore};

/// Bucket capacity used by [`BTrie::new`].
pub const DEFAULT_BUCKET_CAPACITY: usize = 64;

struct BucketEntry {
    suffix: Vec<u8>,
    posting: PostingId,
}

#[derive(Default)]
struct TrieNode {
    /// Child links, sorted by byte. One child per byte at most.
    children: Vec<(u8, usize)>,
    /// Unburst (suffix, posting) records. Suffixes are never empty.
    bucket: Vec<BucketEntry>,
    /// Posting of the term ending exactly at this node.
    posting: Option<PostingId>,
}

/// In-memory burst trie from terms to posting lists.
pub struct BTrie {
    nodes: Vec<TrieNode>,
    bucket_capacity: usize,
    size: u64,
    cardinality: u64,
}

impl BTrie {
    /// Create an empty trie with the default bucket capacity.
    pub fn new() -> Self {
        Self::with_bucket_capacity(DEFAULT_BUCKET_CAPACITY)
    }

    /// Create an empty trie that bursts buckets beyond `capacity`.
    ///
    /// A capacity of zero degenerates to a plain byte trie.
    pub fn with_bucket_capacity(capacity: usize) -> Self {
        BTrie {
            nodes: vec![TrieNode::default()],
            bucket_capacity: capacity,
            size: 1,
            cardinality: 0,
        }
    }

    /// Number of trie nodes, the root included.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of distinct terms ever inserted.
    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    /// Whether no terms were inserted.
    pub fn is_empty(&self) -> bool {
        self.cardinality == 0
    }

    /// Add one occurrence of `term` for `event_id`.
    ///
    /// A term seen before joins its existing posting list; a new term
    /// allocates a list seeded with this event.
    pub fn add(&mut self, term: &str, event_id: u32, store: &mut PostingStore) {
        let mut node = 0;
        let mut rest = term.as_bytes();
        loop {
            if rest.is_empty() {
                match self.nodes[node].posting {
                    Some(posting) => store.add(posting, event_id),
                    None => {
                        self.nodes[node].posting = Some(store.allocate(event_id));
                        self.cardinality += 1;
                    }
                }
                return;
            }

            let first = rest[0];
            if let Some(child) = self.child_of(node, first) {
                node = child;
                rest = &rest[1..];
                continue;
            }

            if let Some(entry) = self.nodes[node]
                .bucket
                .iter_mut()
                .find(|e| e.suffix.as_slice() == rest)
            {
                store.add(entry.posting, event_id);
                return;
            }

            if self.nodes[node].bucket.len() < self.bucket_capacity {
                let posting = store.allocate(event_id);
                self.nodes[node].bucket.push(BucketEntry {
                    suffix: rest.to_vec(),
                    posting,
                });
                self.cardinality += 1;
                return;
            }

            // Bucket full: burst on the incoming first byte and retry
            // one level down. May cascade if the child fills up too.
            node = self.burst(node, first);
            rest = &rest[1..];
        }
    }

    /// Look up the posting list of an exact term.
    pub fn lookup<'a>(&self, term: &str, store: &'a PostingStore) -> Option<&'a RoaringBitmap> {
        let mut node = 0;
        let mut rest = term.as_bytes();
        loop {
            if rest.is_empty() {
                return self.nodes[node].posting.map(|p| store.get(p).bitmap());
            }
            if let Some(child) = self.child_of(node, rest[0]) {
                node = child;
                rest = &rest[1..];
                continue;
            }
            return self.nodes[node]
                .bucket
                .iter()
                .find(|e| e.suffix.as_slice() == rest)
                .map(|e| store.get(e.posting).bitmap());
        }
    }

    fn child_of(&self, node: usize, byte: u8) -> Option<usize> {
        self.nodes[node]
            .children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|i| self.nodes[node].children[i].1)
    }

    /// Create one child under `byte` and rehome the bucket records
    /// starting with it, their first byte stripped. A record reduced to
    /// an empty suffix becomes the child's own posting.
    fn burst(&mut self, parent: usize, byte: u8) -> usize {
        let child = self.nodes.len();
        self.nodes.push(TrieNode::default());
        self.size += 1;

        let bucket = std::mem::take(&mut self.nodes[parent].bucket);
        let mut kept = Vec::with_capacity(bucket.len());
        for entry in bucket {
            if entry.suffix.first() == Some(&byte) {
                let suffix = entry.suffix[1..].to_vec();
                if suffix.is_empty() {
                    self.nodes[child].posting = Some(entry.posting);
                } else {
                    self.nodes[child].bucket.push(BucketEntry {
                        suffix,
                        posting: entry.posting,
                    });
                }
            } else {
                kept.push(entry);
            }
        }
        self.nodes[parent].bucket = kept;

        let pos = self.nodes[parent]
            .children
            .partition_point(|&(b, _)| b < byte);
        self.nodes[parent].children.insert(pos, (byte, child));
        child
    }

    // ── Serialization ───────────────────────────────────────────────

    /// Write the trie depth-first, children before parents, closed by a
    /// fixed64 root offset. Requires a flushed posting store.
    pub fn write<W: Write>(&self, enc: &mut Encoder<W>, store: &PostingStore) -> Result<()> {
        enc.write_header(SegmentFileKind::StringIndex)?;
        let root = self.write_node(0, enc, store)?;
        enc.write_fixed64(root)?;
        Ok(())
    }

    fn write_node<W: Write>(
        &self,
        node: usize,
        enc: &mut Encoder<W>,
        store: &PostingStore,
    ) -> Result<u64> {
        let mut child_offsets = Vec::with_capacity(self.nodes[node].children.len());
        for &(byte, child) in &self.nodes[node].children {
            child_offsets.push((byte, self.write_node(child, enc, store)?));
        }

        let offset = enc.position();
        match self.nodes[node].posting {
            Some(posting) => enc.write_varuint(flushed_offset(store, posting)?)?,
            None => enc.write_varuint(0)?,
        }
        enc.write_varuint(child_offsets.len() as u64)?;
        for (byte, child_offset) in child_offsets {
            enc.write_u8(byte)?;
            enc.write_varuint(child_offset)?;
        }
        enc.write_varuint(self.nodes[node].bucket.len() as u64)?;
        for entry in &self.nodes[node].bucket {
            enc.write_bytes(&entry.suffix)?;
            enc.write_varuint(flushed_offset(store, entry.posting)?)?;
        }
        Ok(offset)
    }
}

impl Default for BTrie {
    fn default() -> Self {
        Self::new()
    }
}

fn flushed_offset(store: &PostingStore, posting: PostingId) -> Result<u64> {
    let offset = store.offset_of(posting);
    if offset == 0 {
        return Err(CalamusError::internal(
            "string index written before posting store flush",
        ));
    }
    Ok(offset)
}

/// Read-side view of a serialized trie.
pub struct BTrieReader<'a> {
    buf: &'a [u8],
    root: u64,
}

impl<'a> BTrieReader<'a> {
    /// Open a trie over a complete file slice.
    pub fn open(buf: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let kind = dec.read_header()?;
        if kind != SegmentFileKind::StringIndex {
            return Err(CalamusError::format(format!(
                "expected StringIndex file, found {kind:?}"
            )));
        }
        if buf.len() < HEADER_LEN + 8 {
            return Err(CalamusError::truncated("string index root offset"));
        }
        dec.seek(buf.len() - 8)?;
        let root = dec.read_fixed64()?;
        if root < HEADER_LEN as u64 || root >= (buf.len() - 8) as u64 {
            return Err(CalamusError::format(format!(
                "string index root offset {root} out of range"
            )));
        }
        Ok(BTrieReader { buf, root })
    }

    /// Resolve a term to its posting file offset.
    pub fn lookup(&self, term: &str) -> Result<Option<u64>> {
        let mut dec = Decoder::new(self.buf);
        let mut node = self.root;
        let mut rest = term.as_bytes();
        loop {
            dec.seek(node as usize)?;
            let posting_offset = dec.read_varuint()?;
            if rest.is_empty() {
                return Ok((posting_offset != 0).then_some(posting_offset));
            }

            let child_count = dec.read_varuint()?;
            let mut descend = None;
            for _ in 0..child_count {
                let byte = dec.read_u8()?;
                let child_offset = dec.read_varuint()?;
                if byte == rest[0] {
                    descend = Some(child_offset);
                    break;
                }
            }
            if let Some(child) = descend {
                node = child;
                rest = &rest[1..];
                continue;
            }

            let bucket_count = dec.read_varuint()?;
            for _ in 0..bucket_count {
                let suffix = dec.read_bytes()?;
                let posting_offset = dec.read_varuint()?;
                if suffix == rest {
                    return Ok(Some(posting_offset));
                }
            }
            return Ok(None);
        }
    }
}

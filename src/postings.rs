//! Bitmap-backed posting lists and their owning store.
//!
//! Every index structure resolves a key to a posting list: the set of
//! event ids carrying that key. Lists live in a single [`PostingStore`]
//! and are referred to by [`PostingId`] handles, so index structures can
//! be rebuilt, serialized, or dropped without touching list ownership.
//!
//! ## Write order
//!
//! [`PostingStore::write_all`] records each list's file offset as it
//! serializes. Index structures copy those offsets by value, so the
//! store must be flushed before any index structure is written. An
//! offset of zero means "not yet written"; the file header makes zero
//! unreachable for a real list.

use roaring::RoaringBitmap;
use std::io::Write;

use crate::codec::{Encoder, SegmentFileKind};
use crate::error::Result;

/// Handle to a posting list inside a [`PostingStore`].
///
/// Handles are only minted by [`PostingStore::allocate`] and are valid
/// for the store that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostingId(u32);

impl PostingId {
    /// Position of the list in allocation order.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// A set of event ids plus the file offset it was serialized at.
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    bitmap: RoaringBitmap,
    offset: u64,
}

impl PostingList {
    fn new(event_id: u32) -> Self {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(event_id);
        PostingList { bitmap, offset: 0 }
    }

    /// Add an event id. Adding an id twice is a no-op.
    pub fn add(&mut self, event_id: u32) {
        self.bitmap.insert(event_id);
    }

    /// The member event ids.
    pub fn bitmap(&self) -> &RoaringBitmap {
        &self.bitmap
    }

    /// File offset the list was serialized at, or zero if unwritten.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of member event ids.
    pub fn len(&self) -> u64 {
        self.bitmap.len()
    }

    /// Whether the list has no members.
    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }
}

/// Sole owner of all posting lists built for a segment.
#[derive(Debug, Default)]
pub struct PostingStore {
    lists: Vec<PostingList>,
}

impl PostingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        PostingStore { lists: Vec::new() }
    }

    /// Allocate a new list seeded with one member.
    pub fn allocate(&mut self, event_id: u32) -> PostingId {
        let id = PostingId(self.lists.len() as u32);
        self.lists.push(PostingList::new(event_id));
        id
    }

    /// Add an event id to an existing list.
    pub fn add(&mut self, id: PostingId, event_id: u32) {
        self.lists[id.0 as usize].add(event_id);
    }

    /// Borrow a list.
    pub fn get(&self, id: PostingId) -> &PostingList {
        &self.lists[id.0 as usize]
    }

    /// File offset of a list, or zero if the store is unflushed.
    pub fn offset_of(&self, id: PostingId) -> u64 {
        self.lists[id.0 as usize].offset
    }

    /// Number of allocated lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether no lists were allocated.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Iterate lists in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &PostingList> {
        self.lists.iter()
    }

    /// Serialize every list in allocation order, recording offsets.
    ///
    /// Each bitmap is run-compressed and streamed in the portable
    /// roaring format, which is self-delimiting, so no length prefix is
    /// needed between lists.
    pub fn write_all<W: Write>(&mut self, enc: &mut Encoder<W>) -> Result<()> {
        enc.write_header(SegmentFileKind::PostingList)?;
        for list in &mut self.lists {
            list.bitmap.optimize();
            list.offset = enc.position();
            list.bitmap.serialize_into(&mut *enc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Decoder;

    #[test]
    fn test_allocate_seeds_one_member() {
        let mut store = PostingStore::new();
        let id = store.allocate(7);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).len(), 1);
        assert!(store.get(id).bitmap().contains(7));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = PostingStore::new();
        let id = store.allocate(3);
        store.add(id, 3);
        store.add(id, 3);
        store.add(id, 9);
        assert_eq!(store.get(id).len(), 2);
    }

    #[test]
    fn test_offsets_recorded_in_allocation_order() {
        let mut store = PostingStore::new();
        let a = store.allocate(1);
        let b = store.allocate(2);
        assert_eq!(store.offset_of(a), 0);
        assert_eq!(store.offset_of(b), 0);

        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        store.write_all(&mut enc).unwrap();

        // Offsets point past the header and increase in allocation order
        assert!(store.offset_of(a) >= 3);
        assert!(store.offset_of(b) > store.offset_of(a));
    }

    #[test]
    fn test_serialized_lists_deserialize_at_offsets() {
        let mut store = PostingStore::new();
        let a = store.allocate(1);
        store.add(a, 2);
        store.add(a, 3);
        let b = store.allocate(1000);
        store.add(b, 2000);

        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        store.write_all(&mut enc).unwrap();

        let mut dec = Decoder::new(&buf);
        assert_eq!(dec.read_header().unwrap(), SegmentFileKind::PostingList);

        for (id, expected) in [(a, vec![1, 2, 3]), (b, vec![1000, 2000])] {
            let offset = store.offset_of(id) as usize;
            let bitmap = RoaringBitmap::deserialize_from(&buf[offset..]).unwrap();
            assert_eq!(bitmap.iter().collect::<Vec<_>>(), expected);
        }
    }
}

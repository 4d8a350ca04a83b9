//! Event segments: accumulation, sealing, and read-back.
//!
//! A [`Segment`] buffers raw events against a fixed schema. Sealing it
//! through [`writer::SegmentWriter`] produces an immutable directory of
//! files sharing the segment codec:
//!
//! ```text
//! <segment id>/
//! ├── posting        all posting list bitmaps, offset-addressed
//! ├── <field>.idx    one index per indexed field with at least one key
//! │                  (burst trie for strings, skip index for numerics)
//! ├── rows           stored event rows plus timestamp statistics
//! ├── rows.idx       event id -> row offset skip index
//! └── info           schema and event count
//! ```
//!
//! Sealed segments are never mutated. [`reader::SegmentReader`] maps the
//! files and serves term, key, and row lookups without locks.

pub mod info;
pub mod reader;
pub mod rows;
pub mod writer;

use uuid::Uuid;

use crate::error::{CalamusError, Result};
use crate::event::Event;
use crate::schema::IndexInfo;

/// Name of the posting list file inside a segment directory.
pub const POSTING_FILE: &str = "posting";
/// Name of the row store file.
pub const ROWS_FILE: &str = "rows";
/// Name of the event id to row offset index.
pub const ROW_INDEX_FILE: &str = "rows.idx";
/// Name of the segment metadata file.
pub const INFO_FILE: &str = "info";

/// Index file name for a field. Field names are validated against the
/// fixed names above when the schema is built, so these never collide.
pub fn field_index_file(field: &str) -> String {
    format!("{field}.idx")
}

/// An in-memory accumulation of events awaiting sealing.
///
/// Event ids are assigned sequentially from zero in arrival order and
/// are dense: the id doubles as the event's position.
pub struct Segment {
    id: Uuid,
    info: IndexInfo,
    next_event_id: u32,
    events: Vec<Event>,
}

impl Segment {
    /// Create an empty segment for the given schema.
    pub fn new(info: IndexInfo) -> Self {
        Segment {
            id: Uuid::new_v4(),
            info,
            next_event_id: 0,
            events: Vec::new(),
        }
    }

    /// Segment id; the sealed directory is named after it.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The schema this segment indexes against.
    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    /// Buffered events in arrival order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Append an event and return its assigned id.
    ///
    /// Fields are validated against the schema when the segment is
    /// sealed, not here; add stays cheap on the ingest path.
    pub fn add(&mut self, event: Event) -> Result<u32> {
        if self.next_event_id == u32::MAX {
            return Err(CalamusError::internal("event id space exhausted"));
        }
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        self.events.push(event);
        Ok(event_id)
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the segment holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn test_event_ids_are_sequential() {
        let info = IndexInfo::builder("logs")
            .add_field("host", FieldType::Keyword, true)
            .build()
            .unwrap();
        let mut segment = Segment::new(info);
        assert!(segment.is_empty());

        for expected in 0..5u32 {
            let id = segment
                .add(Event::new().add_keyword("host", "web-1"))
                .unwrap();
            assert_eq!(id, expected);
        }
        assert_eq!(segment.len(), 5);
    }
}

//! Stored event rows.
//!
//! Rows are written in arrival order. Each row is a field count followed
//! by (field id, value) pairs in schema order, so sparse events cost
//! only what they carry. The file closes with a fixed-width statistics
//! block: minimum and maximum timestamp, event count, and the block's
//! own offset as the final eight bytes, giving readers O(1) access to
//! the statistics without scanning rows.

use std::io::Write;

use crate::codec::{Decoder, Encoder, HEADER_LEN, SegmentFileKind};
use crate::error::{CalamusError, Result};
use crate::event::{Event, Value};
use crate::schema::IndexInfo;

/// Statistics block: min ts, max ts, count, self offset, all fixed64.
const STATS_LEN: usize = 32;

/// Writer for the row store file.
pub struct RowStoreWriter {
    offsets: Vec<u64>,
    min_timestamp: u64,
    max_timestamp: u64,
    saw_timestamp: bool,
    count: u64,
}

impl RowStoreWriter {
    /// Create a writer with empty statistics.
    pub fn new() -> Self {
        RowStoreWriter {
            offsets: Vec::new(),
            min_timestamp: 0,
            max_timestamp: 0,
            saw_timestamp: false,
            count: 0,
        }
    }

    /// Row start offsets in event id order, filled by [`Self::write`].
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Write all rows and the statistics block.
    ///
    /// Every event field must be declared in the schema with a matching
    /// type; violations are schema errors and abort the write.
    pub fn write<W: Write>(
        &mut self,
        enc: &mut Encoder<W>,
        events: &[Event],
        info: &IndexInfo,
    ) -> Result<()> {
        enc.write_header(SegmentFileKind::RowStore)?;

        for event in events {
            self.offsets.push(enc.position());
            self.write_row(enc, event, info)?;
            self.count += 1;
        }

        let stats_offset = enc.position();
        enc.write_fixed64(self.min_timestamp)?;
        enc.write_fixed64(self.max_timestamp)?;
        enc.write_fixed64(self.count)?;
        enc.write_fixed64(stats_offset)?;
        Ok(())
    }

    fn write_row<W: Write>(
        &mut self,
        enc: &mut Encoder<W>,
        event: &Event,
        info: &IndexInfo,
    ) -> Result<()> {
        // Schema order keeps rows deterministic regardless of the
        // event's internal map order
        let mut present = Vec::with_capacity(event.len());
        for field in info.fields() {
            if let Some(value) = event.get(&field.name) {
                present.push((field, value));
            }
        }
        if present.len() != event.len() {
            for name in event.field_names() {
                if info.field(name).is_none() {
                    return Err(CalamusError::schema(format!(
                        "event field '{name}' is not declared in index '{}'",
                        info.name()
                    )));
                }
            }
        }

        enc.write_varuint(present.len() as u64)?;
        for (field, value) in present {
            enc.write_varuint(field.id as u64)?;
            enc.write_value(value, field)?;
            if let Value::Timestamp(ts) = value {
                self.fold_timestamp(*ts);
            }
        }
        Ok(())
    }

    fn fold_timestamp(&mut self, ts: u64) {
        if !self.saw_timestamp {
            self.min_timestamp = ts;
            self.max_timestamp = ts;
            self.saw_timestamp = true;
        } else {
            self.min_timestamp = self.min_timestamp.min(ts);
            self.max_timestamp = self.max_timestamp.max(ts);
        }
    }
}

impl Default for RowStoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-side view of a row store file.
pub struct RowStoreReader<'a> {
    buf: &'a [u8],
    rows_end: usize,
    min_timestamp: u64,
    max_timestamp: u64,
    count: u64,
}

impl<'a> RowStoreReader<'a> {
    /// Open a row store over a complete file slice.
    pub fn open(buf: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let kind = dec.read_header()?;
        if kind != SegmentFileKind::RowStore {
            return Err(CalamusError::format(format!(
                "expected RowStore file, found {kind:?}"
            )));
        }
        if buf.len() < HEADER_LEN + STATS_LEN {
            return Err(CalamusError::truncated("row store statistics"));
        }

        let rows_end = buf.len() - STATS_LEN;
        dec.seek(rows_end)?;
        let min_timestamp = dec.read_fixed64()?;
        let max_timestamp = dec.read_fixed64()?;
        let count = dec.read_fixed64()?;
        let stats_offset = dec.read_fixed64()?;
        if stats_offset != rows_end as u64 {
            return Err(CalamusError::format(format!(
                "row store statistics offset {stats_offset} does not match file layout"
            )));
        }

        Ok(RowStoreReader {
            buf,
            rows_end,
            min_timestamp,
            max_timestamp,
            count,
        })
    }

    /// Smallest timestamp stored, or zero if no event carried one.
    pub fn min_timestamp(&self) -> u64 {
        self.min_timestamp
    }

    /// Largest timestamp stored, or zero if no event carried one.
    pub fn max_timestamp(&self) -> u64 {
        self.max_timestamp
    }

    /// Number of stored rows.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Decode the row at `offset` against the schema.
    pub fn read_event(&self, offset: u64, info: &IndexInfo) -> Result<Event> {
        if offset < HEADER_LEN as u64 || offset >= self.rows_end as u64 {
            return Err(CalamusError::format(format!(
                "row offset {offset} out of range"
            )));
        }
        let mut dec = Decoder::new(self.buf);
        dec.seek(offset as usize)?;

        let field_count = dec.read_varuint()?;
        let mut event = Event::new();
        for _ in 0..field_count {
            let field_id = dec.read_varuint()?;
            let field = u32::try_from(field_id)
                .ok()
                .and_then(|id| info.field_by_id(id))
                .ok_or_else(|| {
                    CalamusError::schema(format!("row references unknown field id {field_id}"))
                })?;
            let value = dec.read_value(field)?;
            event.fields.insert(field.name.clone(), value);
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn make_info() -> IndexInfo {
        IndexInfo::builder("logs")
            .add_field("ts", FieldType::Timestamp, true)
            .add_field("message", FieldType::Text, true)
            .add_field("bytes", FieldType::Int, false)
            .build()
            .unwrap()
    }

    fn make_events() -> Vec<Event> {
        vec![
            Event::new()
                .add_timestamp("ts", 500)
                .add_text("message", "started")
                .add_int("bytes", 10),
            Event::new().add_timestamp("ts", 100),
            Event::new().add_text("message", "no timestamp here"),
            Event::new()
                .add_timestamp("ts", 900)
                .add_text("message", "stopped"),
        ]
    }

    #[test]
    fn test_rows_round_trip() {
        let info = make_info();
        let events = make_events();

        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        let mut writer = RowStoreWriter::new();
        writer.write(&mut enc, &events, &info).unwrap();
        assert_eq!(writer.offsets().len(), events.len());

        let reader = RowStoreReader::open(&buf).unwrap();
        assert_eq!(reader.count(), 4);
        assert_eq!(reader.min_timestamp(), 100);
        assert_eq!(reader.max_timestamp(), 900);

        for (offset, expected) in writer.offsets().iter().zip(&events) {
            let event = reader.read_event(*offset, &info).unwrap();
            assert_eq!(&event, expected);
        }
    }

    #[test]
    fn test_no_timestamps_read_as_zero() {
        let info = make_info();
        let events = vec![Event::new().add_text("message", "only text")];

        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        RowStoreWriter::new().write(&mut enc, &events, &info).unwrap();

        let reader = RowStoreReader::open(&buf).unwrap();
        assert_eq!(reader.min_timestamp(), 0);
        assert_eq!(reader.max_timestamp(), 0);
        assert_eq!(reader.count(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let info = make_info();
        let events = vec![Event::new().add_keyword("surprise", "x")];

        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        let result = RowStoreWriter::new().write(&mut enc, &events, &info);
        assert!(matches!(result, Err(CalamusError::Schema(_))));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let info = make_info();
        // "ts" declared as Timestamp, given an Int
        let events = vec![Event::new().add_int("ts", 5)];

        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        let result = RowStoreWriter::new().write(&mut enc, &events, &info);
        assert!(matches!(result, Err(CalamusError::Schema(_))));
    }

    #[test]
    fn test_bad_row_offset_rejected() {
        let info = make_info();
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        RowStoreWriter::new()
            .write(&mut enc, &make_events(), &info)
            .unwrap();

        let reader = RowStoreReader::open(&buf).unwrap();
        assert!(reader.read_event(0, &info).is_err());
        assert!(reader.read_event(u64::MAX, &info).is_err());
    }
}

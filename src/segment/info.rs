//! Segment metadata file.
//!
//! The `info` file makes a segment self-describing: it carries the full
//! schema and the event count, so a reader needs no out-of-band state
//! to interpret the other files in the directory.

use std::io::Write;

use crate::codec::{Decoder, Encoder, SegmentFileKind};
use crate::error::{CalamusError, Result};
use crate::schema::{FieldType, IndexInfo};

/// Metadata persisted alongside a segment's data files.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    schema: IndexInfo,
    event_count: u64,
}

impl SegmentInfo {
    /// Pair a schema with the number of events sealed into the segment.
    pub fn new(schema: IndexInfo, event_count: u64) -> Self {
        SegmentInfo {
            schema,
            event_count,
        }
    }

    /// Schema of the sealed segment.
    pub fn schema(&self) -> &IndexInfo {
        &self.schema
    }

    /// Number of events sealed into the segment.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Serialize the metadata.
    pub fn write<W: Write>(&self, enc: &mut Encoder<W>) -> Result<()> {
        enc.write_header(SegmentFileKind::SegmentInfo)?;
        enc.write_string(self.schema.name())?;
        enc.write_varuint(self.schema.len() as u64)?;
        for field in self.schema.fields() {
            enc.write_string(&field.name)?;
            enc.write_u8(field.field_type.type_byte())?;
            enc.write_u8(u8::from(field.indexed))?;
        }
        enc.write_varuint(self.event_count)?;
        Ok(())
    }

    /// Decode metadata from a complete `info` file slice.
    pub fn read(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let kind = dec.read_header()?;
        if kind != SegmentFileKind::SegmentInfo {
            return Err(CalamusError::format(format!(
                "expected SegmentInfo file, found {kind:?}"
            )));
        }

        let name = dec.read_string()?;
        let field_count = dec.read_varuint()?;
        // Fields were written in id order, so the builder reassigns the
        // same ids it assigned at build time
        let mut builder = IndexInfo::builder(name);
        for _ in 0..field_count {
            let field_name = dec.read_string()?;
            let field_type = FieldType::from_type_byte(dec.read_u8()?)?;
            let indexed = match dec.read_u8()? {
                0 => false,
                1 => true,
                other => {
                    return Err(CalamusError::format(format!(
                        "invalid indexed flag: {other}"
                    )));
                }
            };
            builder = builder.add_field(field_name, field_type, indexed);
        }
        let schema = builder.build()?;
        let event_count = dec.read_varuint()?;

        Ok(SegmentInfo {
            schema,
            event_count,
        })
    }
}

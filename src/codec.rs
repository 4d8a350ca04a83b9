//! Binary codec shared by every segment file.
//!
//! All on-disk structures are written through [`Encoder`] and read back
//! through [`Decoder`] using the same small set of primitives:
//!
//! - `varuint`: LEB128 variable-length unsigned integer, 1 to 10 bytes,
//!   continuation bit in the MSB of each byte
//! - `zigzag64` / `zigzag32`: signed integers mapped to varuints so that
//!   small magnitudes of either sign stay short
//! - `fixed64` / `fixed32`: little-endian fixed-width integers, used
//!   where byte offsets must be patched or located from the end of a file
//! - `bytes` / `string`: varuint length prefix followed by the raw bytes
//!
//! Every file starts with a two-byte magic tag followed by a one-byte
//! file type, so offset zero can double as a "not written" sentinel.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use crate::error::{CalamusError, Result};
use crate::event::Value;
use crate::schema::{FieldInfo, FieldType};

/// Magic tag opening every segment file.
pub const MAGIC: [u8; 2] = *b"cm";

/// Length of the file header (magic + type byte).
pub const HEADER_LEN: usize = 3;

/// The file type byte written after the magic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFileKind {
    /// Concatenated posting list bitmaps.
    PostingList,
    /// Burst trie over string terms.
    StringIndex,
    /// Multi-level skip index over numeric keys.
    SkipIndex,
    /// Stored event rows.
    RowStore,
    /// Multi-level skip index from event ids to row offsets.
    RowIndex,
    /// Segment schema and statistics.
    SegmentInfo,
}

impl SegmentFileKind {
    /// On-disk type byte. Zero is never a valid type.
    pub fn type_byte(&self) -> u8 {
        match self {
            SegmentFileKind::PostingList => 1,
            SegmentFileKind::StringIndex => 2,
            SegmentFileKind::SkipIndex => 3,
            SegmentFileKind::RowStore => 4,
            SegmentFileKind::RowIndex => 5,
            SegmentFileKind::SegmentInfo => 6,
        }
    }

    /// Decode an on-disk type byte.
    pub fn from_type_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(SegmentFileKind::PostingList),
            2 => Ok(SegmentFileKind::StringIndex),
            3 => Ok(SegmentFileKind::SkipIndex),
            4 => Ok(SegmentFileKind::RowStore),
            5 => Ok(SegmentFileKind::RowIndex),
            6 => Ok(SegmentFileKind::SegmentInfo),
            _ => Err(CalamusError::format(format!(
                "unknown segment file type byte: {byte}"
            ))),
        }
    }
}

/// Streaming writer with a running byte offset.
///
/// The offset counts every byte written since construction, so when the
/// encoder sits at the start of a file its position is the absolute file
/// offset. Implements [`Write`], which lets third-party serializers
/// (posting bitmaps) stream through it while offsets stay accurate.
pub struct Encoder<W: Write> {
    inner: W,
    offset: u64,
}

impl<W: Write> Encoder<W> {
    /// Create an encoder at offset zero.
    pub fn new(inner: W) -> Self {
        Encoder { inner, offset: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Write the file header: magic tag plus type byte.
    pub fn write_header(&mut self, kind: SegmentFileKind) -> Result<()> {
        self.write_all(&MAGIC)?;
        self.write_u8(kind.type_byte())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte])?;
        Ok(())
    }

    /// Write a LEB128 variable-length unsigned integer.
    pub fn write_varuint(&mut self, value: u64) -> Result<()> {
        let mut val = value;
        loop {
            let mut byte = (val & 0x7F) as u8;
            val >>= 7;
            if val != 0 {
                byte |= 0x80; // Set continuation bit
            }
            self.write_all(&[byte])?;
            if val == 0 {
                return Ok(());
            }
        }
    }

    /// Write a zigzag-mapped signed 64-bit integer.
    pub fn write_zigzag64(&mut self, value: i64) -> Result<()> {
        self.write_varuint(((value << 1) ^ (value >> 63)) as u64)
    }

    /// Write a zigzag-mapped signed 32-bit integer.
    pub fn write_zigzag32(&mut self, value: i32) -> Result<()> {
        self.write_varuint(((value << 1) ^ (value >> 31)) as u32 as u64)
    }

    /// Write a little-endian fixed-width 64-bit integer.
    pub fn write_fixed64(&mut self, value: u64) -> Result<()> {
        self.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a little-endian fixed-width 32-bit integer.
    pub fn write_fixed32(&mut self, value: u32) -> Result<()> {
        self.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a 64-bit float as its little-endian bit pattern.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        WriteBytesExt::write_f64::<LittleEndian>(self, value)?;
        Ok(())
    }

    /// Write a length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varuint(bytes.len() as u64)?;
        self.write_all(bytes)?;
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Write a field value in the encoding of its declared type.
    ///
    /// A mismatch between the value variant and the field type is a
    /// schema error, never a silent coercion.
    pub fn write_value(&mut self, value: &Value, field: &FieldInfo) -> Result<()> {
        match (value, field.field_type) {
            (Value::Int(v), FieldType::Int) => self.write_varuint(*v),
            (Value::Timestamp(v), FieldType::Timestamp) => self.write_varuint(*v),
            (Value::Text(s), FieldType::Text) => self.write_string(s),
            (Value::Keyword(s), FieldType::Keyword) => self.write_string(s),
            (Value::Float(v), FieldType::Float) => self.write_f64(*v),
            (value, field_type) => Err(CalamusError::schema(format!(
                "{} value written to field '{}' of type {}",
                value.field_type().as_str(),
                field.name,
                field_type.as_str()
            ))),
        }
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Consume the encoder and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.offset += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Cursor-based reader over an in-memory byte slice.
///
/// Reads never allocate except where the return type demands it; failed
/// reads leave the cursor where the failure was detected.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a decoder at offset zero.
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Move the cursor to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(CalamusError::truncated(format!(
                "seek to {pos} past end of {}-byte input",
                self.buf.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Read and validate the file header, returning the file type.
    pub fn read_header(&mut self) -> Result<SegmentFileKind> {
        if self.remaining() < HEADER_LEN {
            return Err(CalamusError::truncated("file header"));
        }
        let magic = [self.buf[self.pos], self.buf[self.pos + 1]];
        if magic != MAGIC {
            return Err(CalamusError::format(format!(
                "bad magic: {:02x}{:02x}",
                magic[0], magic[1]
            )));
        }
        let byte = self.buf[self.pos + 2];
        let kind = SegmentFileKind::from_type_byte(byte)?;
        self.pos += HEADER_LEN;
        Ok(kind)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.buf.len() {
            return Err(CalamusError::truncated("u8"));
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Read a LEB128 variable-length unsigned integer.
    pub fn read_varuint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            if self.pos >= self.buf.len() {
                return Err(CalamusError::truncated("varint"));
            }
            if shift >= 64 {
                return Err(CalamusError::overflow("varint continues past 10 bytes"));
            }
            let byte = self.buf[self.pos];
            self.pos += 1;
            result |= ((byte & 0x7F) as u64) << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a zigzag-mapped signed 64-bit integer.
    pub fn read_zigzag64(&mut self) -> Result<i64> {
        let n = self.read_varuint()?;
        Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
    }

    /// Read a zigzag-mapped signed 32-bit integer.
    pub fn read_zigzag32(&mut self) -> Result<i32> {
        let n = self.read_varuint()?;
        if n > u32::MAX as u64 {
            return Err(CalamusError::overflow("zigzag32 exceeds 32 bits"));
        }
        let n = n as u32;
        Ok(((n >> 1) as i32) ^ -((n & 1) as i32))
    }

    /// Read a little-endian fixed-width 64-bit integer.
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let end = self.pos + 8;
        if end > self.buf.len() {
            return Err(CalamusError::truncated("fixed64"));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a little-endian fixed-width 32-bit integer.
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        if end > self.buf.len() {
            return Err(CalamusError::truncated("fixed32"));
        }
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(u32::from_le_bytes(raw))
    }

    /// Read a 64-bit float from its little-endian bit pattern.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Read a length-prefixed byte string, borrowing from the input.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varuint()?;
        if len > self.remaining() as u64 {
            return Err(CalamusError::malformed_length(format!(
                "length prefix {len} exceeds {} remaining bytes",
                self.remaining()
            )));
        }
        let len = len as usize;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| CalamusError::format(format!("invalid UTF-8 string: {e}")))?;
        Ok(s.to_string())
    }

    /// Read a field value in the encoding of its declared type.
    pub fn read_value(&mut self, field: &FieldInfo) -> Result<Value> {
        match field.field_type {
            FieldType::Int => Ok(Value::Int(self.read_varuint()?)),
            FieldType::Timestamp => Ok(Value::Timestamp(self.read_varuint()?)),
            FieldType::Text => Ok(Value::Text(self.read_string()?)),
            FieldType::Keyword => Ok(Value::Keyword(self.read_string()?)),
            FieldType::Float => Ok(Value::Float(self.read_f64()?)),
        }
    }
}

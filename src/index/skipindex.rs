//! Multi-level static skip index over sorted keys.
//!
//! One builder and one layout serve every ordered lookup in a segment:
//! numeric field indexes point keys at posting offsets, the row index
//! points event ids at row offsets.
//!
//! ## File layout
//!
//! ```text
//! level 0:  [key fixed64][offset varuint] ...   every entry, key order
//!           [MAX key    ][0             ]       sentinel
//! level 1:  [key fixed64][offset varuint] ...   every ixl-th level-0 entry
//!           [MAX key    ][level-0 sentinel]     sentinel
//! ...
//! trailer:  [top level offset fixed64][level count fixed64]
//! ```
//!
//! Upper-level offsets locate the sampled entry one level down, so a
//! lookup descends from the top level and finishes with a short scan of
//! at most `ixl` entries at level 0. Levels stop when a level's sample
//! list holds two entries or fewer.
//!
//! Key bytes are fixed 64-bit values interpreted per [`KeyEncoding`],
//! which keeps one layout for unsigned and float keys even though float
//! bit patterns do not sort as integers.

use std::cmp::Ordering;
use std::io::Write;

use crate::codec::{Decoder, Encoder, HEADER_LEN, SegmentFileKind};
use crate::error::{CalamusError, Result};

/// Trailer size: top level offset plus level count, both fixed64.
const TRAILER_LEN: usize = 16;

/// How the fixed 64-bit key bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// Keys are plain u64 values.
    Unsigned,
    /// Keys are f64 bit patterns.
    Float,
}

impl KeyEncoding {
    /// The sentinel key closing every level, greater than any real key.
    pub fn max_raw(self) -> u64 {
        match self {
            KeyEncoding::Unsigned => u64::MAX,
            KeyEncoding::Float => f64::INFINITY.to_bits(),
        }
    }

    /// Compare two raw keys in this encoding.
    pub fn cmp_raw(self, a: u64, b: u64) -> Ordering {
        match self {
            KeyEncoding::Unsigned => a.cmp(&b),
            KeyEncoding::Float => f64::from_bits(a)
                .partial_cmp(&f64::from_bits(b))
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// Write a multi-level skip index for `entries`, which must be sorted by
/// key in the given encoding. The caller writes the file header first;
/// this writes the levels and the trailer.
///
/// `ixl` is the sampling interval: every `ixl`-th entry of a level is
/// promoted to the level above.
///
/// The encoding's maximum raw key closes each level as a sentinel and
/// must not appear in `entries`; a real entry carrying it would read
/// back as the end of its level.
pub fn write_skip_index<W: Write>(
    enc: &mut Encoder<W>,
    entries: &[(u64, u64)],
    ixl: usize,
    encoding: KeyEncoding,
) -> Result<()> {
    if ixl < 2 {
        return Err(CalamusError::internal(format!(
            "skip index interval must be at least 2, got {ixl}"
        )));
    }

    let max = encoding.max_raw();
    let mut current: Vec<(u64, u64)> = entries.to_vec();
    let mut level_count: u64 = 0;
    let mut sentinel_offset: u64 = 0;
    let mut top_offset;

    loop {
        top_offset = enc.position();
        let mut samples = Vec::with_capacity(current.len() / ixl + 1);
        for (i, &(key, payload)) in current.iter().enumerate() {
            if i % ixl == 0 {
                samples.push((key, enc.position()));
            }
            enc.write_fixed64(key)?;
            enc.write_varuint(payload)?;
        }
        let sentinel = enc.position();
        enc.write_fixed64(max)?;
        enc.write_varuint(sentinel_offset)?;
        sentinel_offset = sentinel;
        level_count += 1;

        if samples.len() <= 2 {
            break;
        }
        current = samples;
    }

    enc.write_fixed64(top_offset)?;
    enc.write_fixed64(level_count)?;
    Ok(())
}

/// Read-side view of a serialized skip index.
pub struct SkipIndexReader<'a> {
    buf: &'a [u8],
    encoding: KeyEncoding,
    top_offset: u64,
    levels: u64,
}

impl<'a> SkipIndexReader<'a> {
    /// Open an index over a complete file slice, validating the header
    /// against the expected file kind.
    pub fn open(buf: &'a [u8], kind: SegmentFileKind, encoding: KeyEncoding) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let found = dec.read_header()?;
        if found != kind {
            return Err(CalamusError::format(format!(
                "expected {kind:?} file, found {found:?}"
            )));
        }
        if buf.len() < HEADER_LEN + TRAILER_LEN {
            return Err(CalamusError::truncated("skip index trailer"));
        }

        dec.seek(buf.len() - TRAILER_LEN)?;
        let top_offset = dec.read_fixed64()?;
        let levels = dec.read_fixed64()?;
        if levels == 0 || top_offset >= (buf.len() - TRAILER_LEN) as u64 {
            return Err(CalamusError::format(format!(
                "skip index trailer out of range: top {top_offset}, levels {levels}"
            )));
        }

        Ok(SkipIndexReader {
            buf,
            encoding,
            top_offset,
            levels,
        })
    }

    /// Number of levels in the index.
    pub fn levels(&self) -> u64 {
        self.levels
    }

    /// Find the first entry with key >= `target`, descending from the
    /// top level. Returns the raw key and its payload offset, or `None`
    /// when `target` is greater than every key.
    pub fn seek(&self, target: u64) -> Result<Option<(u64, u64)>> {
        let mut pos = self.top_offset;
        for _ in 1..self.levels {
            pos = self.descend(pos, target)?;
        }
        self.scan_bottom(pos, target)
    }

    /// Resolve `target` exactly: a seek that only accepts an equal key.
    pub fn get(&self, target: u64) -> Result<Option<u64>> {
        match self.seek(target)? {
            Some((key, payload)) if self.encoding.cmp_raw(key, target) == Ordering::Equal => {
                Ok(Some(payload))
            }
            _ => Ok(None),
        }
    }

    /// At an upper level, pick the last entry with key <= `target` (or
    /// the level's first entry) and return its lower-level offset.
    fn descend(&self, pos: u64, target: u64) -> Result<u64> {
        let max = self.encoding.max_raw();
        let mut dec = Decoder::new(self.buf);
        dec.seek(pos as usize)?;

        let (mut key, mut payload) = read_entry(&mut dec)?;
        while key != max {
            let (next_key, next_payload) = read_entry(&mut dec)?;
            if self.encoding.cmp_raw(next_key, target) == Ordering::Greater {
                break;
            }
            key = next_key;
            payload = next_payload;
        }
        Ok(payload)
    }

    /// At level 0, scan forward to the first entry with key >= `target`.
    fn scan_bottom(&self, pos: u64, target: u64) -> Result<Option<(u64, u64)>> {
        let max = self.encoding.max_raw();
        let mut dec = Decoder::new(self.buf);
        dec.seek(pos as usize)?;

        loop {
            let (key, payload) = read_entry(&mut dec)?;
            if key == max {
                return Ok(None);
            }
            if self.encoding.cmp_raw(key, target) != Ordering::Less {
                return Ok(Some((key, payload)));
            }
        }
    }
}

fn read_entry(dec: &mut Decoder<'_>) -> Result<(u64, u64)> {
    let key = dec.read_fixed64()?;
    let payload = dec.read_varuint()?;
    Ok((key, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(u64, u64)], ixl: usize, encoding: KeyEncoding) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.write_header(SegmentFileKind::SkipIndex).unwrap();
        write_skip_index(&mut enc, entries, ixl, encoding).unwrap();
        buf
    }

    fn open(buf: &[u8], encoding: KeyEncoding) -> SkipIndexReader<'_> {
        SkipIndexReader::open(buf, SegmentFileKind::SkipIndex, encoding).unwrap()
    }

    #[test]
    fn test_empty_index_finds_nothing() {
        let buf = build(&[], 4, KeyEncoding::Unsigned);
        let reader = open(&buf, KeyEncoding::Unsigned);
        assert_eq!(reader.levels(), 1);
        assert_eq!(reader.seek(0).unwrap(), None);
        assert_eq!(reader.get(42).unwrap(), None);
    }

    #[test]
    fn test_single_level_exact_and_ceiling() {
        let entries: Vec<(u64, u64)> = vec![(10, 100), (20, 200), (30, 300)];
        let buf = build(&entries, 4, KeyEncoding::Unsigned);
        let reader = open(&buf, KeyEncoding::Unsigned);
        assert_eq!(reader.levels(), 1);

        assert_eq!(reader.seek(10).unwrap(), Some((10, 100)));
        assert_eq!(reader.seek(15).unwrap(), Some((20, 200)));
        assert_eq!(reader.seek(5).unwrap(), Some((10, 100)));
        assert_eq!(reader.seek(30).unwrap(), Some((30, 300)));
        assert_eq!(reader.seek(31).unwrap(), None);
        // the top of the key domain is the level sentinel, never a hit
        assert_eq!(reader.seek(u64::MAX).unwrap(), None);

        assert_eq!(reader.get(20).unwrap(), Some(200));
        assert_eq!(reader.get(21).unwrap(), None);
    }

    #[test]
    fn test_multi_level_descent() {
        // 100 keys force at least two levels at ixl = 4
        let entries: Vec<(u64, u64)> = (0..100).map(|i| (i * 10, 1000 + i)).collect();
        let buf = build(&entries, 4, KeyEncoding::Unsigned);
        let reader = open(&buf, KeyEncoding::Unsigned);
        assert!(reader.levels() >= 2, "levels = {}", reader.levels());

        for i in 0..100u64 {
            assert_eq!(reader.get(i * 10).unwrap(), Some(1000 + i), "key {}", i * 10);
            // Ceiling from just below
            if i > 0 {
                assert_eq!(reader.seek(i * 10 - 1).unwrap(), Some((i * 10, 1000 + i)));
            }
        }
        assert_eq!(reader.seek(991).unwrap(), None);
        assert_eq!(reader.get(995).unwrap(), None);
    }

    #[test]
    fn test_float_keys_order_by_value_not_bits() {
        // Negative floats would sort after positives as raw bits
        let keys = [-100.5f64, -1.0, 0.0, 0.5, 2.0, 1000.25];
        let entries: Vec<(u64, u64)> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.to_bits(), i as u64))
            .collect();
        let buf = build(&entries, 2, KeyEncoding::Float);
        let reader = open(&buf, KeyEncoding::Float);

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(reader.get(key.to_bits()).unwrap(), Some(i as u64));
        }
        let (found, payload) = reader.seek((-2.0f64).to_bits()).unwrap().unwrap();
        assert_eq!(f64::from_bits(found), -1.0);
        assert_eq!(payload, 1);
        assert_eq!(reader.seek(2000.0f64.to_bits()).unwrap(), None);
        // an infinite target walks the sentinel chain down to level 0
        assert_eq!(reader.seek(f64::INFINITY.to_bits()).unwrap(), None);
    }

    #[test]
    fn test_rejects_wrong_file_kind() {
        let buf = build(&[(1, 1)], 4, KeyEncoding::Unsigned);
        let result = SkipIndexReader::open(&buf, SegmentFileKind::RowIndex, KeyEncoding::Unsigned);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_tiny_interval() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.write_header(SegmentFileKind::SkipIndex).unwrap();
        assert!(write_skip_index(&mut enc, &[], 1, KeyEncoding::Unsigned).is_err());
    }
}

//! Bounds-checked big-endian reader

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Cursor over an in-memory BRRES buffer.
///
/// All reads are bounds-checked and fail with [`Error::Truncated`] naming the
/// offset and the number of bytes the read needed.
pub struct BinReader<'a> {
    data: &'a [u8],
    pos: usize,
    marks: Vec<usize>,
}

impl<'a> BinReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            marks: Vec::new(),
        }
    }

    /// Total length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::OffsetOutOfRange {
                offset: offset as i64,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Skip forward to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let target = super::align_up(self.pos, alignment);
        self.seek(target)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::Truncated {
                offset: self.pos,
                expected: count,
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    pub fn read_magic(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Read a 4-byte tag and fail unless it equals `expected`.
    pub fn expect_magic(&mut self, expected: &[u8; 4]) -> Result<()> {
        let offset = self.pos;
        let found = self.read_magic()?;
        if &found != expected {
            return Err(Error::InvalidMagic {
                expected: *expected,
                found,
                offset,
            });
        }
        Ok(())
    }

    /// Remember the current position as the base of the section being read.
    pub fn mark(&mut self) -> usize {
        self.marks.push(self.pos);
        self.pos
    }

    /// Pop the innermost mark and return the cursor to it.
    pub fn recall(&mut self) -> usize {
        let offset = self.marks.pop().unwrap_or(0);
        self.pos = offset;
        offset
    }

    /// The innermost section base, or 0 outside any section.
    #[must_use]
    pub fn base(&self) -> usize {
        self.marks.last().copied().unwrap_or(0)
    }

    /// Resolve an offset relative to `base`. Zero means "absent".
    pub fn resolve(&self, base: usize, relative: i32) -> Result<Option<usize>> {
        if relative == 0 {
            return Ok(None);
        }
        let absolute = base as i64 + i64::from(relative);
        if absolute < 0 || absolute >= self.data.len() as i64 {
            return Err(Error::OffsetOutOfRange {
                offset: absolute,
                len: self.data.len(),
            });
        }
        Ok(Some(absolute as usize))
    }

    /// Read a length-prefixed name referenced by `relative` from `base`.
    ///
    /// The offset points at the first character; the u32 length sits in the
    /// four bytes before it.
    pub fn read_name(&self, base: usize, relative: i32) -> Result<String> {
        let Some(offset) = self.resolve(base, relative)? else {
            return Ok(String::new());
        };
        if offset < 4 {
            return Err(Error::InvalidName { offset });
        }
        let len = BigEndian::read_u32(&self.data[offset - 4..offset]) as usize;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::Truncated {
                offset,
                expected: len,
            })?;
        String::from_utf8(self.data[offset..end].to_vec()).map_err(|_| Error::InvalidName { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_read_reports_offset() {
        let data = [0u8, 1, 2];
        let mut reader = BinReader::new(&data);
        reader.skip(2).unwrap();
        match reader.read_u32() {
            Err(Error::Truncated { offset, expected }) => {
                assert_eq!(offset, 2);
                assert_eq!(expected, 4);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_big_endian_values() {
        let data = [0x12, 0x34, 0xFF, 0xFE, 0x3F, 0x80, 0x00, 0x00];
        let mut reader = BinReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert!((reader.read_f32().unwrap() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_resolve_rejects_out_of_range() {
        let data = [0u8; 16];
        let reader = BinReader::new(&data);
        assert_eq!(reader.resolve(4, 0).unwrap(), None);
        assert_eq!(reader.resolve(4, 8).unwrap(), Some(12));
        assert!(matches!(
            reader.resolve(4, 12),
            Err(Error::OffsetOutOfRange { offset: 16, len: 16 })
        ));
        assert!(reader.resolve(4, -8).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let data = *b"MDL0";
        let mut reader = BinReader::new(&data);
        assert!(matches!(
            reader.expect_magic(b"TEX0"),
            Err(Error::InvalidMagic { offset: 0, .. })
        ));
    }
}

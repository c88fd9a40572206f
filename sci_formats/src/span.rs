use std::fmt;
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use thiserror::Error;

use crate::version::Endian;

/// A read or subspan request fell outside the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("access of {width} bytes at offset {offset:#x} is outside a {len}-byte span (base {base:#x})")]
pub struct SpanError {
    pub offset: usize,
    pub width: usize,
    pub len: usize,
    pub base: usize,
}

/// Bounds-checked view over a shared, immutable byte buffer.
///
/// Cloning or taking a subspan never copies the underlying bytes. `base`
/// records where the view starts relative to the root buffer it was carved
/// from, so offsets can be translated back after several `subspan` calls.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteSpan {
    data: Bytes,
    base: usize,
}

impl ByteSpan {
    pub fn new(data: impl Into<Bytes>) -> Self {
        ByteSpan {
            data: data.into(),
            base: 0,
        }
    }

    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the first byte of this view within the root buffer.
    pub fn base_offset(&self) -> usize {
        self.base
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn check(&self, offset: usize, width: usize) -> Result<Range<usize>, SpanError> {
        match offset.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(SpanError {
                offset,
                width,
                len: self.data.len(),
                base: self.base,
            }),
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, SpanError> {
        let range = self.check(offset, 1)?;
        Ok(self.data[range.start])
    }

    pub fn read_u16_le(&self, offset: usize) -> Result<u16, SpanError> {
        let range = self.check(offset, 2)?;
        Ok(LittleEndian::read_u16(&self.data[range]))
    }

    pub fn read_u16_be(&self, offset: usize) -> Result<u16, SpanError> {
        let range = self.check(offset, 2)?;
        Ok(BigEndian::read_u16(&self.data[range]))
    }

    pub fn read_u32_le(&self, offset: usize) -> Result<u32, SpanError> {
        let range = self.check(offset, 4)?;
        Ok(LittleEndian::read_u32(&self.data[range]))
    }

    pub fn read_u32_be(&self, offset: usize) -> Result<u32, SpanError> {
        let range = self.check(offset, 4)?;
        Ok(BigEndian::read_u32(&self.data[range]))
    }

    /// Reads a 16-bit word in the game's configured byte order.
    pub fn read_u16(&self, offset: usize, endian: Endian) -> Result<u16, SpanError> {
        match endian {
            Endian::Little => self.read_u16_le(offset),
            Endian::Big => self.read_u16_be(offset),
        }
    }

    pub fn read_u32(&self, offset: usize, endian: Endian) -> Result<u32, SpanError> {
        match endian {
            Endian::Little => self.read_u32_le(offset),
            Endian::Big => self.read_u32_be(offset),
        }
    }

    /// Returns the view starting at `offset`, either to the end of this span
    /// or limited to `len` bytes.
    pub fn subspan(&self, offset: usize, len: Option<usize>) -> Result<ByteSpan, SpanError> {
        let range = match len {
            Some(len) => self.check(offset, len)?,
            None => self.check(offset, 0).map(|range| range.start..self.data.len())?,
        };
        Ok(ByteSpan {
            data: self.data.slice(range.clone()),
            base: self.base + range.start,
        })
    }

    /// Reads a NUL-terminated string. A missing terminator ends the string at
    /// the end of the span.
    pub fn read_c_string(&self, offset: usize) -> Result<String, SpanError> {
        self.check(offset, 1)?;
        let tail = &self.data[offset..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// All (possibly overlapping) offsets at which `needle` occurs.
    pub fn positions_of(&self, needle: &[u8]) -> Vec<usize> {
        if needle.is_empty() || needle.len() > self.data.len() {
            return Vec::new();
        }
        self.data
            .windows(needle.len())
            .enumerate()
            .filter(|(_, window)| *window == needle)
            .map(|(offset, _)| offset)
            .collect()
    }
}

impl fmt::Debug for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSpan")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &self.data.len())
            .finish()
    }
}

impl From<Vec<u8>> for ByteSpan {
    fn from(value: Vec<u8>) -> Self {
        ByteSpan::new(value)
    }
}

//! Binary reader for zero-copy parsing of byte slices.
//!
//! [`BinaryReader`] is a cursor over a borrowed buffer. Archive metadata
//! stores strings and IVs at absolute offsets, so besides sequential reads the
//! reader supports [`BinaryReader::peek_at`], which visits another offset and
//! always returns to where it was.

use zerocopy::FromBytes;

use crate::{Error, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// All multi-byte integers are little-endian.
///
/// # Example
///
/// ```
/// use xvarc_common::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, b'h', b'i', 0x00];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert_eq!(reader.read_cstring().unwrap(), "hi");
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    ///
    /// Seeking exactly to the end is allowed; anything past it is an error.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        match usize::try_from(offset) {
            Ok(position) if position <= self.data.len() => {
                self.position = position;
                Ok(())
            }
            _ => Err(Error::OffsetOutOfRange {
                offset,
                len: self.data.len(),
            }),
        }
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Advance to the next multiple of `alignment`, staying put if already aligned.
    #[inline]
    pub fn align_to(&mut self, alignment: usize) {
        let rem = self.position % alignment;
        if rem != 0 {
            self.advance(alignment - rem);
        }
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read a fixed-size byte array.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian u64.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read the bytes of a null-terminated string, without the terminator.
    pub fn read_cstring_bytes(&mut self) -> Result<&'a [u8]> {
        let remaining = self.remaining_bytes();
        let null_pos = memchr::memchr(0, remaining).ok_or(Error::MissingNullTerminator)?;

        self.position += null_pos + 1;
        Ok(&remaining[..null_pos])
    }

    /// Read a null-terminated UTF-8 string.
    pub fn read_cstring(&mut self) -> Result<&'a str> {
        let bytes = self.read_cstring_bytes()?;
        std::str::from_utf8(bytes).map_err(Error::Utf8)
    }

    /// Read a fixed-length string field, stopping at the first null if any.
    pub fn read_fixed_string(&mut self, length: usize) -> Result<&'a str> {
        let bytes = self.read_bytes(length)?;
        let end = memchr::memchr(0, bytes).unwrap_or(length);
        std::str::from_utf8(&bytes[..end]).map_err(Error::Utf8)
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Run `f` with the reader positioned at `offset`, then restore the position.
    ///
    /// The original position is restored on both success and failure.
    pub fn peek_at<T, E, F>(&mut self, offset: u64, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let saved = self.position;
        self.seek(offset)?;
        let result = f(self);
        self.position = saved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // u32: 0x04030201
            0xAA, 0xBB, // u16: 0xBBAA
            0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // u64
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
        assert_eq!(reader.read_u16().unwrap(), 0xBBAA);
        assert_eq!(reader.read_u64().unwrap(), 0x0102030405060708);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_cstring() {
        let data = b"hello\0world\0";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_cstring().unwrap(), "hello");
        assert_eq!(reader.read_cstring().unwrap(), "world");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_cstring_bytes_skip_validation() {
        let mut reader = BinaryReader::new(b"a\xFFb\0rest");

        assert_eq!(reader.read_cstring_bytes().unwrap(), b"a\xFFb");
        assert_eq!(reader.position(), 4);

        reader.seek(0).unwrap();
        assert!(matches!(reader.read_cstring(), Err(Error::Utf8(_))));
    }

    #[test]
    fn test_cstring_without_terminator() {
        let mut reader = BinaryReader::new(b"abc");
        assert!(matches!(
            reader.read_cstring(),
            Err(Error::MissingNullTerminator)
        ));
    }

    #[test]
    fn test_fixed_string_stops_at_null() {
        let mut reader = BinaryReader::new(b"ab\0\0cd");
        assert_eq!(reader.read_fixed_string(4).unwrap(), "ab");
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn test_peek_at_restores_position() {
        let data = b"\x01\x02\x03\x04name\0";
        let mut reader = BinaryReader::new(data);
        reader.advance(2);

        let name = reader
            .peek_at::<_, Error, _>(4, |r| r.read_cstring().map(str::to_owned))
            .unwrap();
        assert_eq!(name, "name");
        assert_eq!(reader.position(), 2);

        // failure inside the closure still restores
        let failed = reader.peek_at::<_, Error, _>(8, |r| r.read_u64());
        assert!(failed.is_err());
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_seek_bounds() {
        let data = [0u8; 8];
        let mut reader = BinaryReader::new(&data);

        assert!(reader.seek(8).is_ok());
        assert!(reader.is_empty());
        assert!(matches!(
            reader.seek(9),
            Err(Error::OffsetOutOfRange { offset: 9, len: 8 })
        ));
    }

    #[test]
    fn test_align_to() {
        let data = [0u8; 16];
        let mut reader = BinaryReader::new(&data);

        reader.align_to(4);
        assert_eq!(reader.position(), 0);

        reader.advance(5);
        reader.align_to(4);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_eof_error() {
        let data = [0x01, 0x02];
        let mut reader = BinaryReader::new(&data);

        assert!(matches!(
            reader.read_u32(),
            Err(Error::UnexpectedEof { needed: 4, available: 2 })
        ));
    }
}

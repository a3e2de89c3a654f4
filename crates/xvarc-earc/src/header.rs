//! Archive header.
//!
//! The first 64 bytes of every archive. The top bit of `major` doubles as the
//! "entry headers are encrypted" switch and is stripped on decode.

use xvarc_common::BinaryReader;
use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::flags::ArchiveFlags;
use crate::{Error, Result};

/// Bit of `major` marking obfuscated entry headers.
const ENCRYPTED_ENTRY_HEADERS_BIT: u16 = 0x8000;

/// Archive header exactly as stored.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ArchiveHeaderRecord {
    /// Magic tag, see [`ArchiveHeader::MAGIC`]
    pub tag: U32,
    /// Format version minor
    pub minor: U16,
    /// Format version major, high bit = encrypted entry headers
    pub major: U16,
    /// Number of entries in the table of contents
    pub count: U32,
    /// Data alignment block size
    pub block_size: U32,
    /// Offset of the table of contents
    pub offset_toc: U32,
    /// Offset of the name table
    pub offset_name: U32,
    /// Offset of the full path table
    pub offset_full_path: U32,
    /// Offset of the data region
    pub offset_data: U32,
    /// Archive flags
    pub flags: U32,
    /// Compression chunk size in KiB
    pub chunk_size: U32,
    /// Archive hash, mixed into the first rolling key
    pub hash: U64,
    /// Reserved, opaque
    pub padding: [u8; 16],
}

impl ArchiveHeaderRecord {
    /// Size of the record on disk.
    pub const SIZE: usize = 64;
}

/// Decoded archive header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub tag: u32,
    pub minor: u16,
    /// Major version with the encryption bit removed.
    pub major: u16,
    pub count: u32,
    pub block_size: u32,
    pub offset_toc: u32,
    pub offset_name: u32,
    pub offset_full_path: u32,
    pub offset_data: u32,
    pub flags: ArchiveFlags,
    /// Chunk size in KiB.
    pub chunk_size: u32,
    pub hash: u64,
    pub padding: [u8; 16],
    /// Derived once from the high bit of the stored `major`.
    pub encrypted_entry_headers: bool,
}

impl ArchiveHeader {
    /// Expected archive tag ("CRAF" read as a little-endian u32).
    pub const MAGIC: u32 = 1_178_686_019;

    /// Read and validate the header at the reader's position.
    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let record: ArchiveHeaderRecord = reader.read_struct()?;
        Self::from_record(&record)
    }

    /// Decode a raw record, rejecting a wrong tag.
    pub fn from_record(record: &ArchiveHeaderRecord) -> Result<Self> {
        let tag = record.tag.get();
        if tag != Self::MAGIC {
            return Err(Error::BadMagic {
                expected: Self::MAGIC,
                actual: tag,
            });
        }

        let stored_major = record.major.get();
        let encrypted_entry_headers = stored_major & ENCRYPTED_ENTRY_HEADERS_BIT != 0;

        Ok(Self {
            tag,
            minor: record.minor.get(),
            major: stored_major & !ENCRYPTED_ENTRY_HEADERS_BIT,
            count: record.count.get(),
            block_size: record.block_size.get(),
            offset_toc: record.offset_toc.get(),
            offset_name: record.offset_name.get(),
            offset_full_path: record.offset_full_path.get(),
            offset_data: record.offset_data.get(),
            flags: ArchiveFlags::from_bits_retain(record.flags.get()),
            chunk_size: record.chunk_size.get(),
            hash: record.hash.get(),
            padding: record.padding,
            encrypted_entry_headers,
        })
    }

    /// Chunk size in bytes.
    #[inline]
    pub fn chunk_size_bytes(&self) -> u64 {
        u64::from(self.chunk_size) * 1024
    }
}

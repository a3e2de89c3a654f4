//! Table-of-contents entries.
//!
//! Each entry is a fixed 40-byte [`EntryRecord`] plus the values resolved from
//! it while opening the archive: de-obfuscated sizes and offset, the rolling
//! key, the payload IV and the name/path strings.

use std::path::PathBuf;

use tracing::{debug, trace};
use xvarc_common::BinaryReader;
use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::flags::EntryFlags;
use crate::keys::{self, KeyedFields};
use crate::{Error, Result};

/// Bytes at the end of an encrypted payload that hold the IV and a framing byte.
pub const IV_TRAILER_SIZE: u32 = 33;

/// AES block/IV length.
pub const IV_SIZE: usize = 16;

/// Entry record exactly as stored in the table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EntryRecord {
    /// Name + type hash
    pub hash: U64,
    /// Original size (obfuscated unless `SafeHeader`)
    pub size: U32,
    /// Stored size (obfuscated unless `SafeHeader`)
    pub compressed_size: U32,
    /// Entry flags
    pub flags: U32,
    /// Absolute offset of the null-terminated name
    pub offset_name: U32,
    /// Absolute offset of the data (obfuscated unless `SafeHeader`)
    pub offset_data: U64,
    /// Absolute offset of the null-terminated full path
    pub offset_full_path: U32,
    /// Localization type
    pub localize_type: u8,
    /// Localization locale
    pub localize_locale: u8,
    /// Seed for the first chunk sub-header key
    pub key: U16,
}

impl EntryRecord {
    /// Size of the record on disk.
    pub const SIZE: usize = 40;

    #[inline]
    fn keyed_fields(&self) -> KeyedFields {
        KeyedFields {
            size: self.size.get(),
            compressed_size: self.compressed_size.get(),
            offset_data: self.offset_data.get(),
        }
    }
}

/// Values derived from an [`EntryRecord`] while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolved {
    size: u32,
    compressed_size: u32,
    offset_data: u64,
    rolling_key: u64,
    iv: Option<[u8; IV_SIZE]>,
    name: String,
    path: String,
}

/// An entry (file) within an EARC archive.
///
/// This contains metadata about the file, not the file data itself.
/// Use [`Archive::extract`](crate::Archive::extract) to get the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    index: usize,
    record: EntryRecord,
    resolved: Resolved,
}

impl Entry {
    /// Position in the table of contents.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The record as stored, before any de-obfuscation.
    #[inline]
    pub fn record(&self) -> &EntryRecord {
        &self.record
    }

    /// Name + type hash.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.record.hash.get()
    }

    /// Original (uncompressed) size.
    #[inline]
    pub fn size(&self) -> u32 {
        self.resolved.size
    }

    /// Stored size. For encrypted entries this excludes the IV trailer.
    #[inline]
    pub fn compressed_size(&self) -> u32 {
        self.resolved.compressed_size
    }

    #[inline]
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_retain(self.record.flags.get())
    }

    #[inline]
    pub fn offset_name(&self) -> u32 {
        self.record.offset_name.get()
    }

    /// Absolute offset of the payload.
    #[inline]
    pub fn offset_data(&self) -> u64 {
        self.resolved.offset_data
    }

    #[inline]
    pub fn offset_full_path(&self) -> u32 {
        self.record.offset_full_path.get()
    }

    #[inline]
    pub fn localize_type(&self) -> u8 {
        self.record.localize_type
    }

    #[inline]
    pub fn localize_locale(&self) -> u8 {
        self.record.localize_locale
    }

    /// Per-entry key used for the first chunk sub-header.
    #[inline]
    pub fn key(&self) -> u16 {
        self.record.key.get()
    }

    /// Rolling key that decoded this entry (or was passed through it).
    #[inline]
    pub fn rolling_key(&self) -> u64 {
        self.resolved.rolling_key
    }

    /// Payload IV, present for encrypted entries with obfuscated headers.
    #[inline]
    pub fn iv(&self) -> Option<&[u8; IV_SIZE]> {
        self.resolved.iv.as_ref()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.resolved.name
    }

    /// Full path inside the archive.
    #[inline]
    pub fn path(&self) -> &str {
        &self.resolved.path
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags().contains(EntryFlags::ENCRYPTED)
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags().contains(EntryFlags::COMPRESSED)
    }

    /// Get the relative output path for extraction.
    ///
    /// Converts Windows path separators to forward slashes.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(self.path().replace('\\', "/"))
    }

    /// True when `data` is the one-byte "no data" marker returned for empty entries.
    #[inline]
    pub fn is_no_data(&self, data: &[u8]) -> bool {
        self.size() == 0 && !self.is_encrypted() && !self.is_compressed() && data == &crate::NO_DATA[..]
    }
}

/// How entry records are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Every record must carry `SafeHeader`.
    Plain,
    /// Records without `SafeHeader` are obfuscated with the rolling key.
    Obfuscated,
}

impl HeaderMode {
    #[inline]
    pub fn from_encrypted(encrypted_entry_headers: bool) -> Self {
        if encrypted_entry_headers {
            Self::Obfuscated
        } else {
            Self::Plain
        }
    }
}

/// Decode the entry record at the reader's position.
///
/// `rolling_key` is the key handed over by the previous entry. Returns the
/// entry and the key for the next one; the reader ends up right after the
/// record.
pub fn read_entry(
    reader: &mut BinaryReader<'_>,
    index: usize,
    mode: HeaderMode,
    rolling_key: u64,
) -> Result<(Entry, u64)> {
    let record: EntryRecord = reader.read_struct()?;
    let flags = EntryFlags::from_bits_retain(record.flags.get());
    let safe = flags.contains(EntryFlags::SAFE_HEADER);

    if mode == HeaderMode::Plain && !safe {
        return Err(Error::HeaderContractViolation {
            index,
            flags: flags.bits(),
            reason: "plaintext entry header without SafeHeader flag",
        });
    }

    let (mut fields, next_key) = if safe {
        (record.keyed_fields(), rolling_key)
    } else {
        keys::apply_rolling_key(rolling_key, record.hash.get(), record.keyed_fields())
    };

    let mut iv = None;
    if !safe && flags.contains(EntryFlags::ENCRYPTED) {
        match read_iv(reader, &fields) {
            Some((bytes, payload_len)) => {
                iv = Some(bytes);
                fields.compressed_size = payload_len;
            }
            None => debug!(
                index,
                offset = fields.offset_data,
                compressed_size = fields.compressed_size,
                "IV trailer outside the archive"
            ),
        }
    }

    let name = read_string_at(reader, record.offset_name.get())?;
    let path = read_string_at(reader, record.offset_full_path.get())?;

    trace!(
        index,
        %flags,
        size = fields.size,
        offset = fields.offset_data,
        "entry {path}"
    );

    let resolved = Resolved {
        size: fields.size,
        compressed_size: fields.compressed_size,
        offset_data: fields.offset_data,
        rolling_key: next_key,
        iv,
        name,
        path,
    };

    Ok((
        Entry {
            index,
            record,
            resolved,
        },
        next_key,
    ))
}

/// Read the IV stored near the end of an encrypted payload.
///
/// Returns the IV and the payload length without its trailer, or `None` when
/// the trailer does not fit the archive. Such an entry keeps its decoded
/// fields and fails when extracted.
fn read_iv(reader: &mut BinaryReader<'_>, fields: &KeyedFields) -> Option<([u8; IV_SIZE], u32)> {
    let payload_len = fields.compressed_size.checked_sub(IV_TRAILER_SIZE)?;
    let iv_offset = fields.offset_data.checked_add(u64::from(payload_len))?;

    let iv = reader
        .peek_at(iv_offset, |r| r.read_array::<IV_SIZE>())
        .ok()?;

    Some((iv, payload_len))
}

/// Names are not guaranteed to be UTF-8; invalid bytes become U+FFFD.
fn read_string_at(reader: &mut BinaryReader<'_>, offset: u32) -> Result<String> {
    reader.peek_at(u64::from(offset), |r| {
        r.read_cstring_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .map_err(Error::from)
    })
}

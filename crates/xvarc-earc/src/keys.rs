//! Rolling-key obfuscation of entry metadata.
//!
//! Entry records in archives with encrypted entry headers have their sizes and
//! data offset XORed with keys derived from a 64-bit rolling key. The first
//! key is `master_key ^ header.hash`; every entry without the `SafeHeader`
//! flag derives the key for the next one, so entries must be decoded in
//! table-of-contents order.
//!
//! All arithmetic wraps on overflow.

use tracing::trace;

use crate::flags::ArchiveFlags;

/// Master key for archives without the `Encrypted` flag.
pub const PRIMARY_MASTER_KEY: u64 = 0xCBF2_9CE4_8422_2325;

/// Master key for archives with the `Encrypted` flag.
pub const SECONDARY_MASTER_KEY: u64 = 0x40D4_CCA2_6981_1DAF;

/// Multiplier applied to the rolling key for every derived key.
pub const ENTRY_KEY: u64 = 0x0000_0100_0000_01B3;

/// Multiplier of the per-entry `key` for the first chunk sub-header key.
pub const PRIMARY_CHUNK_KEY: u64 = 0x10E6_4D70_C2A2_9A69;

/// Addend for the first chunk sub-header key.
pub const SECONDARY_CHUNK_KEY: u64 = 0x0000_0C63_D3DC_167E;

/// Select the master key for a set of archive flags.
#[inline]
pub fn master_key_for(flags: ArchiveFlags) -> u64 {
    if flags.contains(ArchiveFlags::ENCRYPTED) {
        SECONDARY_MASTER_KEY
    } else {
        PRIMARY_MASTER_KEY
    }
}

/// Rolling key handed to the first entry.
#[inline]
pub fn initial_rolling_key(master_key: u64, archive_hash: u64) -> u64 {
    master_key ^ archive_hash
}

/// Entry fields as affected by the rolling key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedFields {
    pub size: u32,
    pub compressed_size: u32,
    pub offset_data: u64,
}

/// Apply the rolling key `key` to one entry's fields.
///
/// Returns the transformed fields and the rolling key for the next entry.
/// The transform is an involution for a fixed `key` and `hash`, so the same
/// call obfuscates plaintext fields.
pub fn apply_rolling_key(key: u64, hash: u64, fields: KeyedFields) -> (KeyedFields, u64) {
    let file_size_key = key.wrapping_mul(ENTRY_KEY) ^ hash;
    let data_offset_key = file_size_key.wrapping_mul(ENTRY_KEY) ^ !hash;

    let uncompressed_part = (file_size_key >> 32) as u32;
    let compressed_part = file_size_key as u32;

    trace!("rolling key {key:#018x} -> {data_offset_key:#018x}");

    let out = KeyedFields {
        size: fields.size ^ uncompressed_part,
        compressed_size: fields.compressed_size ^ compressed_part,
        offset_data: fields.offset_data ^ data_offset_key,
    };

    (out, data_offset_key)
}

/// XOR keys for the first chunk sub-header of a compressed entry.
///
/// Returns `(compressed_size_key, decompressed_size_key)`.
#[inline]
pub fn chunk_keys(entry_key: u16) -> (u32, u32) {
    let chunk_key = PRIMARY_CHUNK_KEY
        .wrapping_mul(u64::from(entry_key))
        .wrapping_add(SECONDARY_CHUNK_KEY);

    ((chunk_key >> 32) as u32, chunk_key as u32)
}

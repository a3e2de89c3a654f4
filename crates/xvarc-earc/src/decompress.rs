//! Chunked zlib decompression of entry payloads.
//!
//! A compressed payload is a run of independently zlib-compressed chunks, each
//! producing at most `chunk_size` bytes. Every chunk starts with an 8-byte
//! sub-header (`compressed: u32`, `decompressed: u32`); chunks after the first
//! start on a 4-byte boundary relative to the payload start. When the archive
//! obfuscates entry headers, the first sub-header is XORed with
//! [`keys::chunk_keys`].

use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::{trace, warn};
use xvarc_common::BinaryReader;

use crate::keys;
use crate::{Error, Result};

/// Alignment of every chunk after the first.
const CHUNK_ALIGNMENT: usize = 4;

/// Cap on the initial output reservation, as a multiple of the stored bytes.
const MAX_RESERVE_RATIO: usize = 4;

/// Number of chunks needed for `size` bytes.
#[inline]
pub fn chunk_count(size: u32, chunk_size: u64) -> u64 {
    u64::from(size).div_ceil(chunk_size)
}

/// Decompress a chunked payload.
///
/// * `data` - the stored payload, starting at the first sub-header
/// * `size` - original size of the entry
/// * `chunk_size` - chunk size in bytes
/// * `first_chunk_key` - the entry key, when the first sub-header is obfuscated
pub fn decompress_chunks(
    data: &[u8],
    size: u32,
    chunk_size: u64,
    first_chunk_key: Option<u16>,
) -> Result<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize);
    }

    let chunks = chunk_count(size, chunk_size);
    let mut output = Vec::with_capacity(initial_capacity(size, data.len()));
    let mut reader = BinaryReader::new(data);

    for index in 0..chunks {
        if index > 0 {
            reader.align_to(CHUNK_ALIGNMENT);
        }

        let mut compressed = reader.read_u32()?;
        let mut decompressed = reader.read_u32()?;

        if index == 0 {
            if let Some(key) = first_chunk_key {
                let (compressed_key, decompressed_key) = keys::chunk_keys(key);
                compressed ^= compressed_key;
                decompressed ^= decompressed_key;
            }
        }

        trace!(index, compressed, decompressed, "chunk");

        let chunk = reader.read_bytes(compressed as usize)?;
        let before = output.len();
        ZlibDecoder::new(chunk)
            .read_to_end(&mut output)
            .map_err(|e| Error::Decompression(format!("chunk {index}: {e}")))?;

        let produced = output.len() - before;
        if produced != decompressed as usize {
            warn!(index, produced, decompressed, "chunk size differs from sub-header");
        }
    }

    if output.len() != size as usize {
        warn!(expected = size, actual = output.len(), "decompressed size mismatch");
    }

    Ok(output)
}

/// Output reservation; `size` is untrusted until the chunks have decoded.
fn initial_capacity(size: u32, stored_len: usize) -> usize {
    (size as usize).min(stored_len.saturating_mul(MAX_RESERVE_RATIO))
}

#[cfg(test)]
mod tests {
    use super::*;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Lay out `plain` the way the archive writer does.
    fn build(plain: &[u8], chunk_size: usize, key: Option<u16>) -> Vec<u8> {
        let mut out = Vec::new();
        for (index, part) in plain.chunks(chunk_size).enumerate() {
            if index > 0 {
                while out.len() % 4 != 0 {
                    out.push(0xEE);
                }
            }

            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            let compressed = encoder.finish().unwrap();

            let mut sizes = (compressed.len() as u32, part.len() as u32);
            if index == 0 {
                if let Some(key) = key {
                    let (a, b) = keys::chunk_keys(key);
                    sizes = (sizes.0 ^ a, sizes.1 ^ b);
                }
            }
            out.extend_from_slice(&sizes.0.to_le_bytes());
            out.extend_from_slice(&sizes.1.to_le_bytes());
            out.extend_from_slice(&compressed);
        }
        out
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 7) % 251) as u8).collect()
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(1, 1024), 1);
        assert_eq!(chunk_count(1024, 1024), 1);
        assert_eq!(chunk_count(1025, 1024), 2);
        assert_eq!(chunk_count(0, 1024), 0);
    }

    #[test]
    fn test_single_chunk() {
        let plain = b"Hello, World! This is a test of chunked compression.";
        let data = build(plain, 1024, None);

        let out = decompress_chunks(&data, plain.len() as u32, 1024, None).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_multiple_aligned_chunks() {
        let plain = sample(5000);
        let data = build(&plain, 1024, None);

        let out = decompress_chunks(&data, plain.len() as u32, 1024, None).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_obfuscated_first_chunk() {
        let plain = sample(3000);
        let data = build(&plain, 1024, Some(0x4242));

        let out = decompress_chunks(&data, plain.len() as u32, 1024, Some(0x4242)).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_wrong_chunk_key_fails() {
        let plain = sample(3000);
        let data = build(&plain, 1024, Some(1));

        assert!(decompress_chunks(&data, plain.len() as u32, 1024, Some(2)).is_err());
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(matches!(
            decompress_chunks(&[0; 8], 10, 0, None),
            Err(Error::InvalidChunkSize)
        ));
    }

    #[test]
    fn test_reservation_bounded_by_stored_bytes() {
        assert_eq!(initial_capacity(100, 1000), 100);
        assert_eq!(initial_capacity(u32::MAX, 16), 16 * MAX_RESERVE_RATIO);
    }

    #[test]
    fn test_garbage_size_fails_on_chunk_data() {
        let plain = sample(100);
        let data = build(&plain, 1024, None);

        assert!(decompress_chunks(&data, u32::MAX, 1024, None).is_err());
    }

    #[test]
    fn test_truncated_chunk() {
        let plain = sample(100);
        let data = build(&plain, 1024, None);

        assert!(decompress_chunks(&data[..data.len() - 4], 100, 1024, None).is_err());
    }
}

//! Error types for the EARC crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when working with EARC archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reader error (truncated data, bad string, seek past end).
    #[error("{0}")]
    Common(#[from] xvarc_common::Error),

    /// The archive (or its backing file at extraction time) does not exist.
    #[error("archive not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Header tag did not match the archive magic.
    #[error("invalid archive tag: expected {expected}, got {actual}")]
    BadMagic { expected: u32, actual: u32 },

    /// An entry record was decoded through the wrong path for its `SafeHeader` bit.
    #[error("entry {index} violates header contract (flags {flags:#x}): {reason}")]
    HeaderContractViolation {
        index: usize,
        flags: u32,
        reason: &'static str,
    },

    /// Entry index beyond the table of contents.
    #[error("entry index {index} out of range ({count} entries)")]
    IndexOutOfRange { index: usize, count: usize },

    /// Entry data lies (partly) outside of the archive.
    #[error("entry data at {offset:#x} (+{len}) is outside of a {file_len} byte archive")]
    DataOutOfBounds { offset: u64, len: u64, file_len: u64 },

    /// An encrypted entry has no recovered IV.
    #[error("entry {index} is encrypted but has no IV")]
    MissingIv { index: usize },

    /// The archive header declares a chunk size of zero.
    #[error("archive chunk size is zero")]
    InvalidChunkSize,

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    Decryption(String),
}

/// Result type for EARC operations.
pub type Result<T> = std::result::Result<T, Error>;

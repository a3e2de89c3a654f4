//! Error types for xvarc-common.

use thiserror::Error;

/// Errors raised by [`BinaryReader`](crate::BinaryReader).
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// Absolute seek target lies past the end of the buffer.
    #[error("offset {offset:#x} is outside of a {len} byte buffer")]
    OffsetOutOfRange { offset: u64, len: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Missing null terminator in string.
    #[error("string missing null terminator")]
    MissingNullTerminator,
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

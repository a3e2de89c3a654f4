//! EARC archive reader for Luminous engine game files.
//!
//! An EARC archive is a 64-byte header, a table of 40-byte entry records,
//! a string region and the entry payloads. On top of that layout:
//!
//! - Entry records may be obfuscated with a rolling 64-bit key chained through
//!   the table of contents ([`keys`])
//! - Payloads may be AES-128-CBC encrypted with a per-entry IV
//! - Payloads may be split into zlib-compressed chunks whose first sub-header
//!   is obfuscated
//!
//! # Example
//!
//! ```no_run
//! use xvarc_earc::Archive;
//!
//! let archive = Archive::open("autoexternal.earc")?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.path(), entry.size());
//! }
//!
//! if let Some(entry) = archive.get(0) {
//!     let extracted = archive.extract_declared(entry)?;
//!     if !extracted.is_no_data() {
//!         println!("{} bytes", extracted.declared().len());
//!     }
//! }
//! # Ok::<(), xvarc_earc::Error>(())
//! ```

mod archive;
mod crypto;
mod decompress;
mod entry;
mod error;
mod flags;
mod header;
pub mod keys;

pub use archive::{Archive, ExtractedEntry, NO_DATA};
pub use crypto::PAYLOAD_KEY;
pub use decompress::chunk_count;
pub use entry::{Entry, EntryRecord, IV_SIZE, IV_TRAILER_SIZE};
pub use error::{Error, Result};
pub use flags::{ArchiveFlags, EntryFlags};
pub use header::{ArchiveHeader, ArchiveHeaderRecord};

//! Common utilities for xvarc.
//!
//! - [`BinaryReader`] - Zero-copy, seekable reading from byte slices, with
//!   scoped "read elsewhere and come back" support for absolute-offset fields
//! - [`Error`] - Errors raised while reading

mod error;
mod reader;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

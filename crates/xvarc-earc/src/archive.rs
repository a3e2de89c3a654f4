//! EARC archive reader.
//!
//! Opening an archive decodes the header and the whole table of contents in
//! one pass, threading the rolling key from entry to entry. Extraction is
//! independent per call: every call maps the archive afresh and touches no
//! shared state, so entries can be extracted from several threads at once.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;
use xvarc_common::BinaryReader;

use crate::crypto;
use crate::decompress;
use crate::entry::{self, Entry, EntryRecord, HeaderMode};
use crate::flags::{ArchiveFlags, EntryFlags};
use crate::header::ArchiveHeader;
use crate::keys;
use crate::{Error, Result};

/// Returned by [`Archive::extract`] for plain entries of size zero.
///
/// Means "no data": callers should not write a file for it.
pub const NO_DATA: [u8; 1] = [0];

/// Where the archive bytes come from.
enum Source {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

/// Extracted payload together with the size declared by its entry.
///
/// Encrypted payloads keep their cipher padding, so `data` can be longer than
/// `declared_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    data: Vec<u8>,
    declared_size: u32,
    no_data: bool,
}

impl ExtractedEntry {
    /// Bytes exactly as produced by extraction.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Original size recorded in the table of contents.
    #[inline]
    pub fn declared_size(&self) -> u32 {
        self.declared_size
    }

    /// The data cut to the declared size (never extended).
    #[inline]
    pub fn declared(&self) -> &[u8] {
        &self.data[..self.data.len().min(self.declared_size as usize)]
    }

    /// True when the entry has no payload and nothing should be written.
    #[inline]
    pub fn is_no_data(&self) -> bool {
        self.no_data
    }
}

/// An opened EARC archive.
pub struct Archive {
    source: Source,
    name: String,
    header: ArchiveHeader,
    master_key: u64,
    entries: Vec<Entry>,
}

impl Archive {
    /// Open an archive on disk and decode its table of contents.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mmap = map_file(path)?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let (header, master_key, entries) = Self::parse(&mmap)?;
        debug!(archive = %name, entries = entries.len(), "opened archive");

        Ok(Self {
            source: Source::File(path.to_path_buf()),
            name,
            header,
            master_key,
            entries,
        })
    }

    /// Decode an archive held in memory.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        let (header, master_key, entries) = Self::parse(&data)?;

        Ok(Self {
            source: Source::Memory(data),
            name: "memory".to_string(),
            header,
            master_key,
            entries,
        })
    }

    fn parse(data: &[u8]) -> Result<(ArchiveHeader, u64, Vec<Entry>)> {
        let mut reader = BinaryReader::new(data);
        let header = ArchiveHeader::read(&mut reader)?;

        let master_key = keys::master_key_for(header.flags);
        let mode = HeaderMode::from_encrypted(header.encrypted_entry_headers);
        let mut rolling_key = keys::initial_rolling_key(master_key, header.hash);

        debug!(
            major = header.major,
            minor = header.minor,
            count = header.count,
            flags = %header.flags,
            encrypted_entry_headers = header.encrypted_entry_headers,
            "archive header"
        );

        // Records follow the header directly.
        let count = header.count as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining() / EntryRecord::SIZE));

        for index in 0..count {
            let (entry, next_key) = entry::read_entry(&mut reader, index, mode, rolling_key)?;
            rolling_key = next_key;
            entries.push(entry);
        }

        Ok((header, master_key, entries))
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location on disk, `None` for in-memory archives.
    #[inline]
    pub fn physical_path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Memory(_) => None,
        }
    }

    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    #[inline]
    pub fn flags(&self) -> ArchiveFlags {
        self.header.flags
    }

    /// Replace the archive flags, reselecting the master key.
    ///
    /// Writing the current flags back is a no-op. Entries are not re-decoded.
    pub fn set_flags(&mut self, flags: ArchiveFlags) {
        if flags == self.header.flags {
            return;
        }

        self.header.flags = flags;
        self.master_key = keys::master_key_for(flags);
        debug!(%flags, "flags changed, master key {:#018x}", self.master_key);
    }

    /// Master key selected by the `Encrypted` archive flag.
    #[inline]
    pub fn master_key(&self) -> u64 {
        self.master_key
    }

    #[inline]
    pub fn encrypted_entry_headers(&self) -> bool {
        self.header.encrypted_entry_headers
    }

    /// Get the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in table-of-contents order.
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Find an entry by path or name (case-insensitive, either separator).
    pub fn find(&self, name: &str) -> Option<&Entry> {
        let wanted = name.replace('\\', "/");
        self.entries.iter().find(|e| {
            e.path().replace('\\', "/").eq_ignore_ascii_case(&wanted)
                || e.name().eq_ignore_ascii_case(&wanted)
        })
    }

    /// Extract an entry's payload.
    ///
    /// Encrypted entries are decrypted (padding kept), compressed entries are
    /// decompressed, anything else is copied. A plain entry of size zero
    /// yields [`NO_DATA`].
    pub fn extract(&self, entry: &Entry) -> Result<Vec<u8>> {
        self.with_data(|data| self.extract_from(data, entry))
    }

    /// Extract entry by index.
    pub fn extract_index(&self, index: usize) -> Result<Vec<u8>> {
        self.extract(self.entry_at(index)?)
    }

    /// Extract an entry, keeping its declared size alongside the data.
    pub fn extract_declared(&self, entry: &Entry) -> Result<ExtractedEntry> {
        let data = self.extract(entry)?;
        Ok(ExtractedEntry {
            no_data: entry.is_no_data(&data),
            declared_size: entry.size(),
            data,
        })
    }

    /// Parallel extraction of multiple entries.
    #[cfg(feature = "parallel")]
    pub fn extract_parallel(&self, indices: &[usize]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        indices
            .par_iter()
            .map(|&index| self.extract_index(index))
            .collect()
    }

    /// Parallel extraction with callback for streaming.
    ///
    /// Fails early only on an out-of-range index; extraction errors are
    /// handed to the callback.
    #[cfg(feature = "parallel")]
    pub fn extract_parallel_with<F>(&self, indices: &[usize], callback: F) -> Result<()>
    where
        F: FnMut(&Entry, Result<Vec<u8>>) + Send,
    {
        use rayon::prelude::*;
        use std::sync::Mutex;

        let callback = Mutex::new(callback);

        indices.par_iter().try_for_each(|&index| {
            let entry = self.entry_at(index)?;
            let result = self.extract(entry);

            let mut callback = callback.lock().unwrap_or_else(|p| p.into_inner());
            (*callback)(entry, result);
            Ok(())
        })
    }

    // Internal methods

    fn entry_at(&self, index: usize) -> Result<&Entry> {
        self.entries.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.entries.len(),
        })
    }

    fn with_data<T>(&self, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        match &self.source {
            Source::File(path) => {
                let mmap = map_file(path)?;
                f(&mmap)
            }
            Source::Memory(data) => f(data),
        }
    }

    fn extract_from(&self, data: &[u8], entry: &Entry) -> Result<Vec<u8>> {
        let flags = entry.flags();
        debug!(index = entry.index(), %flags, path = entry.path(), "extracting");

        if flags.contains(EntryFlags::ENCRYPTED) {
            let iv = entry.iv().ok_or(Error::MissingIv {
                index: entry.index(),
            })?;
            let stored = slice(data, entry.offset_data(), entry.compressed_size())?;
            crypto::decrypt(stored, iv)
        } else if flags.contains(EntryFlags::COMPRESSED) {
            let stored = slice(data, entry.offset_data(), entry.compressed_size())?;
            let first_chunk_key = self.header.encrypted_entry_headers.then(|| entry.key());
            decompress::decompress_chunks(
                stored,
                entry.size(),
                self.header.chunk_size_bytes(),
                first_chunk_key,
            )
        } else if entry.size() == 0 {
            Ok(NO_DATA.to_vec())
        } else {
            Ok(slice(data, entry.offset_data(), entry.size())?.to_vec())
        }
    }
}

/// Map a file read-only, reporting a missing file as [`Error::NotFound`].
fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;

    // SAFETY: the mapping is read-only and lives only as long as this call's
    // use of it; archives are not modified while being read.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn slice(data: &[u8], offset: u64, len: u32) -> Result<&[u8]> {
    let out_of_bounds = || Error::DataOutOfBounds {
        offset,
        len: u64::from(len),
        file_len: data.len() as u64,
    };

    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len as usize).ok_or_else(out_of_bounds)?;
    data.get(start..end).ok_or_else(out_of_bounds)
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("name", &self.name)
            .field("flags", &self.header.flags)
            .field("entries", &self.entries.len())
            .finish()
    }
}

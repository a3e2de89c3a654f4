//! Archive and entry flag sets.
//!
//! Bits without a name are kept as stored and shown in hex by `Display`.

use std::fmt;

bitflags::bitflags! {
    /// Archive-wide flags stored in the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ArchiveFlags: u32 {
        const HAS_LOOSE_DATA = 0x1;
        const HAS_LOCALE_DATA = 0x2;
        const DEBUG_ARCHIVE = 0x4;
        /// Selects the secondary master key.
        const ENCRYPTED = 0x8;
    }
}

bitflags::bitflags! {
    /// Per-entry flags stored in the table of contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u32 {
        const AUTOLOAD = 0x1;
        const COMPRESSED = 0x2;
        const REFERENCE = 0x4;
        const NO_EARC = 0x8;
        const PATCHED = 0x10;
        const PATCHED_DELETED = 0x20;
        const ENCRYPTED = 0x40;
        /// Metadata stored in plaintext; bypasses the rolling key.
        const SAFE_HEADER = 0x80;
    }
}

const ARCHIVE_LABELS: &[(ArchiveFlags, &str)] = &[
    (ArchiveFlags::HAS_LOOSE_DATA, "loose"),
    (ArchiveFlags::HAS_LOCALE_DATA, "locale"),
    (ArchiveFlags::DEBUG_ARCHIVE, "debug"),
    (ArchiveFlags::ENCRYPTED, "encrypted"),
];

const ENTRY_LABELS: &[(EntryFlags, &str)] = &[
    (EntryFlags::AUTOLOAD, "autoload"),
    (EntryFlags::COMPRESSED, "compressed"),
    (EntryFlags::REFERENCE, "reference"),
    (EntryFlags::NO_EARC, "noearc"),
    (EntryFlags::PATCHED, "patched"),
    (EntryFlags::PATCHED_DELETED, "patched-deleted"),
    (EntryFlags::ENCRYPTED, "encrypted"),
    (EntryFlags::SAFE_HEADER, "safe"),
];

/// Write `a|b|0x100`, or `-` for an empty set.
fn write_labels<F>(f: &mut fmt::Formatter<'_>, flags: F, labels: &[(F, &str)]) -> fmt::Result
where
    F: bitflags::Flags<Bits = u32> + Copy,
{
    let mut rest = flags.bits();
    let mut first = true;
    for (flag, label) in labels {
        if flags.contains(*flag) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(label)?;
            rest &= !flag.bits();
            first = false;
        }
    }
    if rest != 0 {
        if !first {
            f.write_str("|")?;
        }
        write!(f, "{rest:#x}")?;
    } else if first {
        f.write_str("-")?;
    }
    Ok(())
}

impl fmt::Display for ArchiveFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_labels(f, *self, ARCHIVE_LABELS)
    }
}

impl fmt::Display for EntryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_labels(f, *self, ENTRY_LABELS)
    }
}

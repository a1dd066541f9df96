//! Uniform entry iteration over the archive formats a rootfs can ship in:
//! ustar (raw/gzip/bzip2/xz) and SquashFS.
//!
//! Callers obtain an [`EntryIterator`] via [`open`] without needing to know
//! which concrete format or compression the source turned out to be.

mod squashfs;
mod tar;

use std::io;
use std::path::Path;

use crate::error::WslSwitchError;

/// The kind of filesystem object one archive entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    RegularFile,
    Directory,
    Symlink,
    Hardlink,
    CharDev,
    BlockDev,
    Fifo,
    Socket,
}

/// Canonical in-memory representation of one archive entry, independent of
/// the source format.
#[derive(Debug, Clone)]
pub struct InodeRecord {
    /// Relative POSIX path; never starts with `./`, never absolute.
    pub path: String,
    pub kind: InodeKind,
    /// 12-bit permission + sticky/setuid/setgid bits (no type bits).
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Used for atime/mtime/ctime alike downstream.
    pub mtime: i64,
    /// Populated only for Symlink/Hardlink.
    pub link_target: Option<String>,
    /// Declared content length; for RegularFile this is the byte count the
    /// extractor must read from the accompanying content stream.
    pub size: u64,
}

/// One entry read from an archive, or a recoverable per-entry failure. The
/// content reader is borrowed only for the duration of the callback: it
/// streams directly off the underlying archive reader, never buffering an
/// entire file's bytes in memory.
pub type EntryResult<'a> = Result<(InodeRecord, &'a mut dyn io::Read), WslSwitchError>;

/// A lazy, finite, non-restartable stream of archive entries, driven
/// push-style: the reader calls `visit` once per entry while the
/// underlying decoder is still borrowed, instead of handing back an owned
/// buffer per entry. A single `Err` from decoding one entry's header
/// doesn't stop iteration; only [`open`] failing is fatal.
pub trait ArchiveReader {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(EntryResult<'_>),
    ) -> Result<(), WslSwitchError>;
}

/// Archive format detected by [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    SquashFs,
}

/// Open `path`, sniffing its format, and return a boxed reader over its
/// entries. Fatal only if the archive itself cannot be opened or its
/// container format cannot be determined; per-entry problems surface later
/// as `Err` items passed to [`ArchiveReader::for_each_entry`]'s visitor.
pub fn open(path: &Path) -> Result<Box<dyn ArchiveReader>, WslSwitchError> {
    if squashfs::is_squashfs(path)? {
        return Ok(Box::new(squashfs::SquashFsArchiveReader::open(path)?));
    }
    Ok(Box::new(tar::TarArchiveReader::open(path)?))
}

//! Ustar reading, with compression auto-detection and tolerance for
//! concatenated streams (multiple layers glued together with zero-block
//! padding between them).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use super::{ArchiveReader, EntryResult, InodeKind, InodeRecord};
use crate::error::WslSwitchError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];

enum Codec {
    Gzip,
    Bzip2,
    Xz,
    Raw,
}

/// Deterministic, fixed-order magic sniff: gzip, bzip2, xz, then raw.
/// Never driven by map/dictionary iteration order.
fn sniff(path: &Path) -> Result<Codec, WslSwitchError> {
    let mut header = [0u8; 6];
    let mut f = open_err(path, File::open(path))?;
    let n = open_err(path, f.read(&mut header))?;
    let buf = &header[..n];
    if buf.len() >= GZIP_MAGIC.len() && buf[..GZIP_MAGIC.len()] == GZIP_MAGIC {
        Ok(Codec::Gzip)
    } else if buf.len() >= BZIP2_MAGIC.len() && buf[..BZIP2_MAGIC.len()] == BZIP2_MAGIC {
        Ok(Codec::Bzip2)
    } else if buf.len() >= XZ_MAGIC.len() && buf[..XZ_MAGIC.len()] == XZ_MAGIC {
        Ok(Codec::Xz)
    } else {
        Ok(Codec::Raw)
    }
}

fn open_err<T>(path: &Path, result: std::io::Result<T>) -> Result<T, WslSwitchError> {
    result.map_err(|e| WslSwitchError::ArchiveOpenError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn trim_leading_dot_slash(name: &str) -> String {
    name.strip_prefix("./").unwrap_or(name).to_string()
}

pub struct TarArchiveReader {
    path: PathBuf,
    archive: ::tar::Archive<Box<dyn Read>>,
}

impl TarArchiveReader {
    pub fn open(path: &Path) -> Result<Self, WslSwitchError> {
        let codec = sniff(path)?;
        let file = open_err(path, File::open(path))?;
        let reader: Box<dyn Read> = match codec {
            Codec::Gzip => Box::new(GzDecoder::new(file)),
            Codec::Bzip2 => Box::new(BzDecoder::new(file)),
            Codec::Xz => Box::new(XzDecoder::new(file)),
            Codec::Raw => Box::new(file),
        };

        let mut archive = ::tar::Archive::new(reader);
        archive.set_ignore_zeros(true);

        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Reads everything but the content bytes: path, type, mode, ownership,
    /// link target. Leaves the entry's content stream untouched so the
    /// caller can read it lazily, or skip it entirely for kinds that have
    /// no content.
    fn decode_header(
        entry: &mut ::tar::Entry<'_, Box<dyn Read>>,
    ) -> Result<InodeRecord, WslSwitchError> {
        let path = entry
            .path()
            .map_err(|e| WslSwitchError::EntryError {
                path: "<unknown>".into(),
                cause: e.to_string(),
            })?
            .to_string_lossy()
            .into_owned();

        let entry_err = |cause: String| WslSwitchError::EntryError {
            path: path.clone(),
            cause,
        };

        let header = entry.header().clone();
        let mode = header.mode().map_err(|e| entry_err(e.to_string()))? & 0o7777;
        let uid = header.uid().map_err(|e| entry_err(e.to_string()))? as u32;
        let gid = header.gid().map_err(|e| entry_err(e.to_string()))? as u32;
        let mtime = header.mtime().map_err(|e| entry_err(e.to_string()))? as i64;
        let size = header.size().map_err(|e| entry_err(e.to_string()))?;

        let link_name = |e: &::tar::Entry<'_, Box<dyn Read>>| -> Option<String> {
            e.link_name()
                .ok()
                .flatten()
                .map(|p| p.to_string_lossy().into_owned())
        };

        let (kind, link_target) = match header.entry_type() {
            ::tar::EntryType::Directory => (InodeKind::Directory, None),
            ::tar::EntryType::Symlink => (InodeKind::Symlink, link_name(entry)),
            ::tar::EntryType::Link => (
                InodeKind::Hardlink,
                link_name(entry).map(|t| trim_leading_dot_slash(&t)),
            ),
            ::tar::EntryType::Char => (InodeKind::CharDev, None),
            ::tar::EntryType::Block => (InodeKind::BlockDev, None),
            ::tar::EntryType::Fifo => (InodeKind::Fifo, None),
            _ => (InodeKind::RegularFile, None),
        };

        Ok(InodeRecord {
            path,
            kind,
            mode,
            uid,
            gid,
            mtime,
            link_target,
            size,
        })
    }
}

impl ArchiveReader for TarArchiveReader {
    /// Walks the archive's `Entries` iterator in place, calling `visit`
    /// once per member while that member's content is still live on the
    /// underlying (possibly compressed) stream — nothing is buffered past
    /// what `visit` itself chooses to read.
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(EntryResult<'_>),
    ) -> Result<(), WslSwitchError> {
        let raw_entries = self.archive.entries().map_err(|e| WslSwitchError::ArchiveOpenError {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        for raw in raw_entries {
            match raw {
                Ok(mut entry) => match Self::decode_header(&mut entry) {
                    Ok(record) => visit(Ok((record, &mut entry))),
                    Err(e) => visit(Err(e)),
                },
                Err(e) => visit(Err(WslSwitchError::EntryError {
                    path: "<unknown>".into(),
                    cause: e.to_string(),
                })),
            }
        }
        Ok(())
    }
}

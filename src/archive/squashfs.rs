//! SquashFS reading. Block decoding itself is delegated entirely to
//! `backhand`; this module only walks the resulting inode tree and maps it
//! onto [`InodeRecord`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use backhand::{FilesystemReader, InnerNode};

use super::{ArchiveReader, EntryResult, InodeKind, InodeRecord};
use crate::error::WslSwitchError;

const SQUASHFS_MAGIC: [u8; 4] = *b"hsqs";

pub fn is_squashfs(path: &Path) -> Result<bool, WslSwitchError> {
    let mut header = [0u8; 4];
    let mut f = File::open(path).map_err(|e| WslSwitchError::ArchiveOpenError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let n = f.read(&mut header).map_err(|e| WslSwitchError::ArchiveOpenError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(n >= 4 && header == SQUASHFS_MAGIC)
}

pub struct SquashFsArchiveReader {
    fs: FilesystemReader<File>,
}

impl SquashFsArchiveReader {
    pub fn open(path: &Path) -> Result<Self, WslSwitchError> {
        let file = File::open(path).map_err(|e| WslSwitchError::ArchiveOpenError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let fs = FilesystemReader::from_reader(file).map_err(|e| WslSwitchError::ArchiveOpenError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { fs })
    }
}

impl ArchiveReader for SquashFsArchiveReader {
    /// Walks the pre-parsed inode tree in pre-order, handing `visit` a
    /// live content reader per regular file (`FilesystemReader::file`
    /// decompresses blocks on demand) instead of draining every file into
    /// an owned buffer up front.
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(EntryResult<'_>),
    ) -> Result<(), WslSwitchError> {
        for node in self.fs.files() {
            let path_str = node
                .fullpath
                .to_string_lossy()
                .trim_start_matches('/')
                .to_string();
            let header = &node.header;
            let mode = header.permissions as u32;
            let uid = header.uid;
            let gid = header.gid;
            let mtime = header.mtime as i64;

            let record_with = |kind: InodeKind, link_target: Option<String>| InodeRecord {
                path: path_str.clone(),
                kind,
                mode,
                uid,
                gid,
                mtime,
                link_target,
                size: 0,
            };

            match &node.inner {
                InnerNode::Dir(_) => {
                    visit(Ok((record_with(InodeKind::Directory, None), &mut std::io::empty())));
                }
                InnerNode::File(file) => {
                    let record = record_with(InodeKind::RegularFile, None);
                    let mut reader = self.fs.file(file);
                    visit(Ok((record, &mut reader)));
                }
                InnerNode::Symlink(link) => {
                    let target = link.link.to_string_lossy().into_owned();
                    visit(Ok((record_with(InodeKind::Symlink, Some(target)), &mut std::io::empty())));
                }
                InnerNode::CharacterDevice(_) => {
                    visit(Ok((record_with(InodeKind::CharDev, None), &mut std::io::empty())));
                }
                InnerNode::BlockDevice(_) => {
                    visit(Ok((record_with(InodeKind::BlockDev, None), &mut std::io::empty())));
                }
                InnerNode::NamedPipe => {
                    visit(Ok((record_with(InodeKind::Fifo, None), &mut std::io::empty())));
                }
                InnerNode::Socket => {
                    visit(Ok((record_with(InodeKind::Socket, None), &mut std::io::empty())));
                }
            }
        }
        Ok(())
    }
}

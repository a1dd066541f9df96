//! The `lxattrb` binary record: the 56-byte NTFS extended attribute WSL1
//! reads to recover POSIX mode/owner/timestamp metadata for a file that
//! otherwise lives on NTFS as a plain file or directory.
//!
//! # Layout
//!
//! Little-endian, 56 bytes total:
//!
//! ```text
//!   Offset  Size  Field
//!   ──────  ────  ─────
//!     0       2   flags    (always 0)
//!     2       2   version  (always 1)
//!     4       4   mode     (type bits in high nibble + permission bits)
//!     8       4   uid
//!    12       4   gid
//!    16       4   drive    (always 0)
//!    20      12   reserved (zero-filled)
//!    32       8   atime
//!    40       8   mtime
//!    48       8   ctime
//! ```
//!
//! Any deviation from this layout makes the file unreadable to `bash.exe`
//! under WSL1, surfacing as host error `0x80070002` or `0x8007001f`.

use crate::archive::{InodeKind, InodeRecord};
use crate::error::WslSwitchError;

pub const LXATTRB_LEN: usize = 56;

/// File-type bits occupying the high nibble of `mode` (the POSIX `S_IFMT` family).
pub const IFMT: u32 = 0o170000;
pub const IFSOCK: u32 = 0o140000;
pub const IFLNK: u32 = 0o120000;
pub const IFREG: u32 = 0o100000;
pub const IFBLK: u32 = 0o060000;
pub const IFDIR: u32 = 0o040000;
pub const IFCHR: u32 = 0o020000;
pub const IFIFO: u32 = 0o010000;

/// In-memory form of an `lxattrb` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LxAttrb {
    pub flags: u16,
    pub version: u16,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub drive: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl LxAttrb {
    pub fn new(mode: u32, uid: u32, gid: u32, time: i64) -> Self {
        Self {
            flags: 0,
            version: 1,
            mode,
            uid,
            gid,
            drive: 0,
            atime: time,
            mtime: time,
            ctime: time,
        }
    }
}

fn write_le16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_le32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_le64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_le16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap())
}

fn read_le32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn read_le64(buf: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

/// Pack an `LxAttrb` into its 56-byte wire form. Total: never fails.
pub fn encode(attr: &LxAttrb) -> [u8; LXATTRB_LEN] {
    let mut buf = [0u8; LXATTRB_LEN];
    write_le16(&mut buf, 0, attr.flags);
    write_le16(&mut buf, 2, attr.version);
    write_le32(&mut buf, 4, attr.mode);
    write_le32(&mut buf, 8, attr.uid);
    write_le32(&mut buf, 12, attr.gid);
    write_le32(&mut buf, 16, attr.drive);
    // bytes 20..32 stay zero (reserved)
    write_le64(&mut buf, 32, attr.atime);
    write_le64(&mut buf, 40, attr.mtime);
    write_le64(&mut buf, 48, attr.ctime);
    buf
}

/// Unpack a 56-byte `lxattrb` value. Any other length is malformed.
pub fn decode(bytes: &[u8]) -> Result<LxAttrb, WslSwitchError> {
    if bytes.len() != LXATTRB_LEN {
        return Err(WslSwitchError::MalformedAttribute { len: bytes.len() });
    }
    Ok(LxAttrb {
        flags: read_le16(bytes, 0),
        version: read_le16(bytes, 2),
        mode: read_le32(bytes, 4),
        uid: read_le32(bytes, 8),
        gid: read_le32(bytes, 12),
        drive: read_le32(bytes, 16),
        atime: read_le64(bytes, 32),
        mtime: read_le64(bytes, 40),
        ctime: read_le64(bytes, 48),
    })
}

/// Build the `lxattrb` value for an archive entry: type bits from `kind`,
/// permission bits OR'd in, uid/gid copied, all three timestamps set to
/// `mtime` (the archive format carries only one timestamp per entry).
pub fn from_archive_entry(entry: &InodeRecord) -> LxAttrb {
    let type_bits = match entry.kind {
        InodeKind::Socket => IFSOCK,
        InodeKind::Symlink | InodeKind::Hardlink => IFLNK,
        InodeKind::RegularFile => IFREG,
        InodeKind::BlockDev => IFBLK,
        InodeKind::Directory => IFDIR,
        InodeKind::CharDev => IFCHR,
        InodeKind::Fifo => IFIFO,
    };
    let mode = type_bits | (entry.mode & !IFMT);
    LxAttrb::new(mode, entry.uid, entry.gid, entry.mtime)
}

pub fn is_sock(mode: u32) -> bool {
    mode & IFMT == IFSOCK
}
pub fn is_sym(mode: u32) -> bool {
    mode & IFMT == IFLNK
}
pub fn is_reg(mode: u32) -> bool {
    mode & IFMT == IFREG
}
pub fn is_blk(mode: u32) -> bool {
    mode & IFMT == IFBLK
}
pub fn is_dir(mode: u32) -> bool {
    mode & IFMT == IFDIR
}
pub fn is_chr(mode: u32) -> bool {
    mode & IFMT == IFCHR
}
pub fn is_fifo(mode: u32) -> bool {
    mode & IFMT == IFIFO
}
pub fn is_dev(mode: u32) -> bool {
    is_chr(mode) || is_blk(mode) || is_fifo(mode)
}

pub fn getperms(mode: u32) -> u32 {
    mode & !IFMT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_all_fields() {
        let attr = LxAttrb {
            flags: 0,
            version: 1,
            mode: IFREG | 0o644,
            uid: 1000,
            gid: 1000,
            drive: 0,
            atime: 1_600_000_000,
            mtime: 1_600_000_000,
            ctime: 1_600_000_000,
        };
        let bytes = encode(&attr);
        assert_eq!(bytes.len(), LXATTRB_LEN);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode(&[0u8; 40]).unwrap_err();
        assert!(matches!(err, WslSwitchError::MalformedAttribute { len: 40 }));
    }

    #[test]
    fn mode_type_predicates() {
        assert!(is_dir(IFDIR | 0o755));
        assert!(is_reg(IFREG | 0o644));
        assert!(is_sym(IFLNK | 0o777));
        assert!(!is_dir(IFREG | 0o755));
        assert_eq!(getperms(IFREG | 0o644), 0o644);
    }

    #[test]
    fn from_archive_entry_regular_file() {
        let entry = InodeRecord {
            path: "etc/hostname".into(),
            kind: InodeKind::RegularFile,
            mode: 0o644,
            uid: 0,
            gid: 0,
            mtime: 1_600_000_000,
            link_target: None,
            size: 5,
        };
        let attr = from_archive_entry(&entry);
        assert_eq!(attr.mode, IFREG | 0o644);
        assert_eq!(attr.atime, 1_600_000_000);
        assert_eq!(attr.ctime, 1_600_000_000);
    }

    #[test]
    fn from_archive_entry_hardlink_uses_symlink_type_bits() {
        let entry = InodeRecord {
            path: "usr/bin/true2".into(),
            kind: InodeKind::Hardlink,
            mode: 0o755,
            uid: 0,
            gid: 0,
            mtime: 0,
            link_target: Some("usr/bin/true".into()),
            size: 0,
        };
        let attr = from_archive_entry(&entry);
        assert_eq!(attr.mode & IFMT, IFLNK);
    }
}

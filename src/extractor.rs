//! Drives an [`archive::ArchiveReader`] to materialize a staging rootfs
//! tree: writing file content, translating names, and stamping every entry
//! with its `lxattrb` extended attribute. Content is streamed straight from
//! the archive decoder to disk, one entry at a time — nothing buffers a
//! whole file, let alone a whole archive, in memory.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::archive::{self, InodeKind, InodeRecord};
use crate::error::WslSwitchError;
use crate::metadata::{self, LxAttrb};
use crate::namemap;
use crate::xattr::XAttrGateway;

const LXATTRB: &str = "lxattrb";

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub total: usize,
    pub succeeded: usize,
    pub per_entry_errors: Vec<WslSwitchError>,
}

pub fn extract(
    source: &Path,
    staging_dir: &Path,
    gateway: &dyn XAttrGateway,
    to_gateway_path: impl Fn(&Path) -> String,
) -> Result<ExtractReport, WslSwitchError> {
    prepare_staging_dir(staging_dir)?;

    let mut reader = archive::open(source)?;
    let mut report = ExtractReport::default();

    reader.for_each_entry(&mut |entry| {
        report.total += 1;
        match entry {
            Ok((record, content)) => {
                match materialize(staging_dir, &record, content, gateway, &to_gateway_path) {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        warn!(path = %record.path, error = %e, "failed to materialize entry");
                        report.per_entry_errors.push(e);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "archive entry could not be decoded");
                report.per_entry_errors.push(e);
            }
        }
    })?;

    sweep_directories(staging_dir, gateway, &to_gateway_path)?;
    reset_acls_under_posix_shim(staging_dir);

    Ok(report)
}

/// Cygwin/MSYS-style POSIX shims create NTFS ACLs in an order Windows
/// itself rejects. Detected via the shim's own environment markers; a
/// native Windows invocation never sets these, so this is a no-op there.
/// Best-effort: `icacls` failing doesn't fail the extraction.
fn reset_acls_under_posix_shim(staging_dir: &Path) {
    if std::env::var_os("CYGWIN").is_none() && std::env::var_os("MSYSTEM").is_none() {
        return;
    }
    let _ = std::process::Command::new("icacls")
        .arg(staging_dir)
        .args(["/reset", "/t", "/c", "/q"])
        .status();
}

fn prepare_staging_dir(staging_dir: &Path) -> Result<(), WslSwitchError> {
    if staging_dir.exists() {
        remove_dir_forcibly(staging_dir)?;
        if staging_dir.exists() {
            return Err(WslSwitchError::LeftoverStaging {
                path: staging_dir.display().to_string(),
            });
        }
    }
    fs::create_dir_all(staging_dir).map_err(|e| WslSwitchError::Io {
        context: format!("creating staging directory {}", staging_dir.display()),
        source: e,
    })
}

fn remove_dir_forcibly(dir: &Path) -> Result<(), WslSwitchError> {
    for entry in fs::read_dir(dir).map_err(|e| WslSwitchError::Io {
        context: format!("reading {}", dir.display()),
        source: e,
    })? {
        let entry = entry.map_err(|e| WslSwitchError::Io {
            context: format!("reading entry in {}", dir.display()),
            source: e,
        })?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| WslSwitchError::Io {
            context: format!("stat {}", path.display()),
            source: e,
        })?;
        if metadata.is_dir() {
            remove_dir_forcibly(&path)?;
        } else {
            let mut perms = metadata.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            let _ = fs::set_permissions(&path, perms);
            fs::remove_file(&path).map_err(|e| WslSwitchError::Io {
                context: format!("removing {}", path.display()),
                source: e,
            })?;
        }
    }
    fs::remove_dir(dir).map_err(|e| WslSwitchError::Io {
        context: format!("removing {}", dir.display()),
        source: e,
    })
}

fn normalize_entry_path(path: &str) -> Result<String, WslSwitchError> {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    if stripped.starts_with('/') || stripped.split('/').any(|part| part == "..") {
        return Err(WslSwitchError::EntryError {
            path: path.to_string(),
            cause: "absolute or path-traversing archive entry rejected".to_string(),
        });
    }
    Ok(stripped.to_string())
}

fn materialize(
    staging_dir: &Path,
    record: &InodeRecord,
    content: &mut dyn Read,
    gateway: &dyn XAttrGateway,
    to_gateway_path: &impl Fn(&Path) -> String,
) -> Result<(), WslSwitchError> {
    let normalized = normalize_entry_path(&record.path)?;
    let escaped = namemap::escape_path(&normalized);
    let winpath = staging_dir.join(&escaped);

    let entry_err = |cause: String| WslSwitchError::EntryError {
        path: record.path.clone(),
        cause,
    };

    if let Some(parent) = winpath.parent() {
        fs::create_dir_all(parent).map_err(|e| entry_err(e.to_string()))?;
    }

    match record.kind {
        InodeKind::Directory => {
            fs::create_dir_all(&winpath).map_err(|e| entry_err(e.to_string()))?;
        }
        InodeKind::RegularFile => {
            let mut out = fs::File::create(&winpath).map_err(|e| entry_err(e.to_string()))?;
            std::io::copy(content, &mut out).map_err(|e| entry_err(e.to_string()))?;
        }
        InodeKind::Symlink | InodeKind::Hardlink => {
            write_linklike(&winpath, record.link_target.as_deref().unwrap_or_default())
                .map_err(|e| entry_err(e.to_string()))?;
        }
        InodeKind::CharDev | InodeKind::BlockDev | InodeKind::Fifo | InodeKind::Socket => {
            // WSL1 cannot host device nodes on NTFS: skip.
            return Ok(());
        }
    }

    ensure_writable(&winpath).map_err(|e| entry_err(e.to_string()))?;

    let attr = metadata::from_archive_entry(record);
    write_attr(gateway, to_gateway_path(&winpath), &attr).map_err(|e| entry_err(e.to_string()))
}

/// WSL1 encodes a symlink/hardlink target as the literal byte content of a
/// regular NTFS file; only `lxattrb.mode`'s type bits mark it as a link.
fn write_linklike(path: &Path, target: &str) -> std::io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(target.as_bytes())
}

fn ensure_writable(path: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

fn write_attr(gateway: &dyn XAttrGateway, path: String, attr: &LxAttrb) -> Result<(), WslSwitchError> {
    let bytes = metadata::encode(attr);
    gateway.write(&path, LXATTRB, &bytes)?;
    Ok(())
}

/// Walks `staging_dir` and synthesizes a default `lxattrb` for any entry
/// the archive didn't carry an explicit record for (common for tarballs
/// that omit intermediate directory entries). Idempotent: entries that
/// already carry `lxattrb` are left untouched.
fn sweep_directories(
    staging_dir: &Path,
    gateway: &dyn XAttrGateway,
    to_gateway_path: &impl Fn(&Path) -> String,
) -> Result<(), WslSwitchError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    sweep_dir_recursive(staging_dir, gateway, to_gateway_path, now)
}

fn sweep_dir_recursive(
    dir: &Path,
    gateway: &dyn XAttrGateway,
    to_gateway_path: &impl Fn(&Path) -> String,
    extraction_start: i64,
) -> Result<(), WslSwitchError> {
    ensure_attribute(dir, true, gateway, to_gateway_path, extraction_start)?;

    for entry in fs::read_dir(dir).map_err(|e| WslSwitchError::Io {
        context: format!("reading {}", dir.display()),
        source: e,
    })? {
        let entry = entry.map_err(|e| WslSwitchError::Io {
            context: format!("reading entry in {}", dir.display()),
            source: e,
        })?;
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .map_err(|e| WslSwitchError::Io {
                context: format!("stat {}", path.display()),
                source: e,
            })?
            .is_dir();
        if is_dir {
            sweep_dir_recursive(&path, gateway, to_gateway_path, extraction_start)?;
        } else {
            ensure_attribute(&path, false, gateway, to_gateway_path, extraction_start)?;
        }
    }
    Ok(())
}

fn ensure_attribute(
    path: &Path,
    is_dir: bool,
    gateway: &dyn XAttrGateway,
    to_gateway_path: &impl Fn(&Path) -> String,
    extraction_start: i64,
) -> Result<(), WslSwitchError> {
    let gateway_path = to_gateway_path(path);
    let existing = gateway.read(&gateway_path, LXATTRB)?;
    let present = match existing {
        Some(bytes) => metadata::decode(&bytes).is_ok(),
        None => false,
    };
    if present {
        return Ok(());
    }
    let mode = if is_dir {
        metadata::IFDIR | 0o755
    } else {
        metadata::IFREG | 0o755
    };
    let attr = LxAttrb::new(mode, 0, 0, extraction_start);
    write_attr(gateway, gateway_path, &attr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xattr::FakeXAttrGateway;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn to_path(p: &Path) -> String {
        p.display().to_string()
    }

    #[test]
    fn directory_sweep_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("c"), b"hi").unwrap();

        let gateway = FakeXAttrGateway::new();
        sweep_directories(dir.path(), &gateway, &to_path).unwrap();
        let before: Vec<_> = gateway.list(&to_path(&dir.path().join("a"))).unwrap();

        sweep_directories(dir.path(), &gateway, &to_path).unwrap();
        let after: Vec<_> = gateway.list(&to_path(&dir.path().join("a"))).unwrap();

        assert_eq!(before, after);
        assert!(!before.is_empty());
    }

    #[test]
    fn sweep_synthesizes_directory_type_bits() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let gateway = FakeXAttrGateway::new();
        sweep_directories(dir.path(), &gateway, &to_path).unwrap();

        let bytes = gateway
            .read(&to_path(&dir.path().join("a/b")), LXATTRB)
            .unwrap()
            .unwrap();
        let attr = metadata::decode(&bytes).unwrap();
        assert_eq!(attr.mode & metadata::IFMT, metadata::IFDIR);
    }

    #[test]
    fn materialize_symlink_writes_target_as_content() {
        let dir = tempdir().unwrap();
        let gateway = FakeXAttrGateway::new();
        let record = InodeRecord {
            path: "bin/sh".to_string(),
            kind: InodeKind::Symlink,
            mode: 0o777,
            uid: 0,
            gid: 0,
            mtime: 0,
            link_target: Some("bash".to_string()),
            size: 0,
        };
        materialize(
            dir.path(),
            &record,
            &mut Cursor::new(Vec::new()),
            &gateway,
            &to_path,
        )
        .unwrap();

        let content = fs::read_to_string(dir.path().join("bin/sh")).unwrap();
        assert_eq!(content, "bash");

        let bytes = gateway
            .read(&to_path(&dir.path().join("bin/sh")), LXATTRB)
            .unwrap()
            .unwrap();
        let attr = metadata::decode(&bytes).unwrap();
        assert_eq!(attr.mode & metadata::IFMT, metadata::IFLNK);
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(normalize_entry_path("../etc/passwd").is_err());
        assert!(normalize_entry_path("/etc/passwd").is_err());
        assert_eq!(normalize_entry_path("./etc/passwd").unwrap(), "etc/passwd");
    }
}

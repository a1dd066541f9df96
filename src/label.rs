//! Computing and persisting a rootfs's distribution label, the string that
//! names a `rootfs_<label>` backup slot.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::WslSwitchError;

fn io_err(path: &Path, source: io::Error) -> WslSwitchError {
    WslSwitchError::Io {
        context: format!("reading {}", path.display()),
        source,
    }
}

/// Strips a leading/trailing `"` or `'` pair, the way shell `KEY=VALUE`
/// sourcing would.
fn unquote(value: &str) -> String {
    let value = value.trim();
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn parse_release_file(contents: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), unquote(value).to_lowercase());
        }
    }
    map
}

fn first_non_empty<'a>(
    map: &'a std::collections::HashMap<String, String>,
    keys: &[&str],
) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_empty())
        .map(|s| s.as_str())
}

/// `release_files` is the ordered set of `etc/*release`/`usr/lib/os-release*`
/// candidates to try, relative to `root`.
fn derive_from_release_files(
    root: &Path,
    release_files: &[&str],
) -> Option<String> {
    for rel in release_files {
        let path = root.join(rel);
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        let map = parse_release_file(&contents);
        let name = first_non_empty(&map, &["id", "distrib_id", "name"]);
        let version = first_non_empty(&map, &["distrib_codename", "distrib_release", "version_id"]);
        match (name, version) {
            (Some(name), Some(version)) => return Some(format!("{name}_{version}")),
            (Some(name), None) => return Some(name.to_string()),
            _ => continue,
        }
    }
    None
}

const RELEASE_CANDIDATES: &[&str] = &[
    "etc/os-release",
    "etc/lsb-release",
    "usr/lib/os-release",
    "etc/debian_release",
    "etc/redhat-release",
];

/// Reads the label for the rootfs at `root`, trying, in order: the
/// `.switch_label` file, the `rootfs_<label>` directory-name suffix (caller
/// passes the already-stripped directory name via `dirname_label`), then
/// the `etc/*release`/`os-release` family. Returns `None` only if every
/// source is silent.
pub fn read(root: &Path, dirname_label: Option<&str>) -> Result<Option<String>, WslSwitchError> {
    let switch_label_path = root.join(".switch_label");
    match fs::read_to_string(&switch_label_path) {
        Ok(contents) => {
            if let Some(first_line) = contents.lines().next() {
                let label = first_line.trim();
                if !label.is_empty() {
                    return Ok(Some(label.to_string()));
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(&switch_label_path, e)),
    }

    if let Some(label) = dirname_label {
        if !label.is_empty() {
            persist_best_effort(root, label);
            return Ok(Some(label.to_string()));
        }
    }

    if let Some(label) = derive_from_release_files(root, RELEASE_CANDIDATES) {
        persist_best_effort(root, &label);
        return Ok(Some(label));
    }

    Ok(None)
}

fn persist_best_effort(root: &Path, label: &str) {
    let _ = write(root, label);
}

/// Writes `label\n` to `root/.switch_label`.
pub fn write(root: &Path, label: &str) -> Result<(), WslSwitchError> {
    let path = root.join(".switch_label");
    fs::write(&path, format!("{label}\n")).map_err(|e| io_err(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_existing_switch_label() {
        let dir = tempdir().unwrap();
        write(dir.path(), "debian_stretch").unwrap();
        assert_eq!(
            read(dir.path(), None).unwrap(),
            Some("debian_stretch".to_string())
        );
    }

    #[test]
    fn falls_back_to_dirname_label_and_persists() {
        let dir = tempdir().unwrap();
        let label = read(dir.path(), Some("ubuntu_xenial")).unwrap();
        assert_eq!(label, Some("ubuntu_xenial".to_string()));
        assert_eq!(
            fs::read_to_string(dir.path().join(".switch_label")).unwrap(),
            "ubuntu_xenial\n"
        );
    }

    #[test]
    fn derives_from_os_release() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(
            dir.path().join("etc/os-release"),
            "ID=ubuntu\nVERSION_ID=\"24.04\"\n",
        )
        .unwrap();
        assert_eq!(
            read(dir.path(), None).unwrap(),
            Some("ubuntu_24.04".to_string())
        );
    }

    #[test]
    fn no_source_yields_none() {
        let dir = tempdir().unwrap();
        assert_eq!(read(dir.path(), None).unwrap(), None);
    }
}

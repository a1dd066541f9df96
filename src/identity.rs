//! Carrying the pre-swap WSL default user (and root's password hash, under
//! a configurable policy) across an install: reads the relevant lines out
//! of the old rootfs, then patches/appends them into the new one.

use std::fs;
use std::path::Path;

use crate::error::WslSwitchError;

fn io_err(path: &Path, source: std::io::Error) -> WslSwitchError {
    WslSwitchError::Io {
        context: format!("reading {}", path.display()),
        source,
    }
}

/// The single `root:` and `<user>:` lines captured from one `/etc` file,
/// read before the swap.
#[derive(Debug, Default, Clone)]
pub struct CapturedLines {
    pub root: Option<String>,
    pub user: Option<String>,
}

/// Everything read out of the pre-swap rootfs's identity files.
#[derive(Debug, Default, Clone)]
pub struct CapturedIdentity {
    pub passwd: CapturedLines,
    pub shadow: CapturedLines,
    pub group: CapturedLines,
    pub gshadow: CapturedLines,
}

fn find_lines(path: &Path, user: &str) -> Result<CapturedLines, WslSwitchError> {
    let mut out = CapturedLines::default();
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(io_err(path, e)),
    };
    let user_prefix = format!("{user}:");
    for line in contents.lines() {
        if line.starts_with("root:") {
            out.root = Some(line.to_string());
        }
        if line.starts_with(&user_prefix) {
            out.user = Some(line.to_string());
        }
    }
    Ok(out)
}

/// Reads `root:`/`<user>:` lines from `passwd`, `shadow`, `group`, `gshadow`
/// under `old_root/etc`. Missing files are tolerated (left empty), never
/// fatal — callers should log a warning.
pub fn capture(old_root: &Path, user: &str) -> Result<CapturedIdentity, WslSwitchError> {
    let etc = old_root.join("etc");
    Ok(CapturedIdentity {
        passwd: find_lines(&etc.join("passwd"), user)?,
        shadow: find_lines(&etc.join("shadow"), user)?,
        group: find_lines(&etc.join("group"), user)?,
        gshadow: find_lines(&etc.join("gshadow"), user)?,
    })
}

/// `true` if `hash` denotes "no usable password" (`*`, or anything
/// starting with `!`).
fn is_disabled_hash(hash: &str) -> bool {
    hash == "*" || hash.starts_with('!')
}

fn append_line(path: &Path, line: &str) -> Result<(), WslSwitchError> {
    if line.is_empty() {
        return Ok(());
    }
    let mut contents = fs::read_to_string(path).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(line);
    contents.push('\n');
    fs::write(path, contents).map_err(|e| io_err(path, e))
}

/// Applies the captured identity to `new_root`: appends the user's
/// `passwd`/`group`/`gshadow` lines, and handles `shadow` per
/// `clear_root_shadow_on_missing_hash`.
pub fn reconcile(
    new_root: &Path,
    identity: &CapturedIdentity,
    user: &str,
    clear_root_shadow_on_missing_hash: bool,
) -> Result<(), WslSwitchError> {
    let etc = new_root.join("etc");

    if user != "root" {
        if let Some(line) = &identity.passwd.user {
            append_line(&etc.join("passwd"), line)?;
        }
        if let Some(line) = &identity.group.user {
            append_line(&etc.join("group"), line)?;
        }
        if let Some(line) = &identity.gshadow.user {
            append_line(&etc.join("gshadow"), line)?;
        }
    }

    reconcile_shadow(
        &etc.join("shadow"),
        &identity.shadow,
        clear_root_shadow_on_missing_hash,
    )?;

    Ok(())
}

fn reconcile_shadow(
    path: &Path,
    captured: &CapturedLines,
    clear_root_shadow_on_missing_hash: bool,
) -> Result<(), WslSwitchError> {
    let Some(root_line) = &captured.root else {
        if let Some(user_line) = &captured.user {
            append_line(path, user_line)?;
        }
        return Ok(());
    };

    let fields: Vec<&str> = root_line.split(':').collect();
    let replacement_hash: Option<String> = if fields.len() > 1 && is_disabled_hash(fields[1]) {
        if clear_root_shadow_on_missing_hash {
            None
        } else {
            // explicit opt-in: carry the regular user's hash over root's
            captured
                .user
                .as_ref()
                .and_then(|line| line.split(':').nth(1))
                .map(|s| s.to_string())
        }
    } else if fields.len() > 1 {
        Some(fields[1].to_string())
    } else {
        None
    };

    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(path, e)),
    };

    let mut lines: Vec<String> = contents.lines().map(|l| l.to_string()).collect();
    if let Some(hash) = &replacement_hash {
        for line in lines.iter_mut() {
            if line.starts_with("root:") {
                let mut parts: Vec<String> = line.split(':').map(|s| s.to_string()).collect();
                if parts.len() > 1 {
                    parts[1] = hash.clone();
                }
                *line = parts.join(":");
            }
        }
    }
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    if let Some(user_line) = &captured.user {
        out.push_str(user_line);
        out.push('\n');
    }
    fs::write(path, out).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_etc(root: &Path, file: &str, contents: &str) {
        let etc = root.join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join(file), contents).unwrap();
    }

    #[test]
    fn captures_root_and_user_lines() {
        let dir = tempdir().unwrap();
        write_etc(
            dir.path(),
            "passwd",
            "root:x:0:0:root:/root:/bin/bash\nalice:x:1000:1000::/home/alice:/bin/bash\n",
        );
        let identity = capture(dir.path(), "alice").unwrap();
        assert_eq!(
            identity.passwd.user,
            Some("alice:x:1000:1000::/home/alice:/bin/bash".to_string())
        );
        assert_eq!(
            identity.passwd.root,
            Some("root:x:0:0:root:/root:/bin/bash".to_string())
        );
    }

    #[test]
    fn leaves_disabled_root_hash_untouched_by_default() {
        let dir = tempdir().unwrap();
        write_etc(dir.path(), "shadow", "root:!:18000:0:99999:7:::\n");
        let identity = CapturedIdentity {
            shadow: CapturedLines {
                root: Some("root:!:18000:0:99999:7:::".to_string()),
                user: Some("alice:$6$abc:18000:0:99999:7:::".to_string()),
            },
            ..Default::default()
        };
        reconcile(dir.path(), &identity, "alice", true).unwrap();
        let contents = fs::read_to_string(dir.path().join("etc/shadow")).unwrap();
        let root_line = contents.lines().find(|l| l.starts_with("root:")).unwrap();
        assert_eq!(root_line.split(':').nth(1), Some("!"));
    }

    #[test]
    fn preserves_real_root_hash() {
        let dir = tempdir().unwrap();
        write_etc(dir.path(), "shadow", "root:$6$realhash:18000:0:99999:7:::\n");
        let identity = CapturedIdentity {
            shadow: CapturedLines {
                root: Some("root:$6$realhash:18000:0:99999:7:::".to_string()),
                user: None,
            },
            ..Default::default()
        };
        reconcile(dir.path(), &identity, "root", true).unwrap();
        let contents = fs::read_to_string(dir.path().join("etc/shadow")).unwrap();
        assert!(contents.contains("$6$realhash"));
    }

    #[test]
    fn copies_user_hash_when_policy_disabled() {
        let dir = tempdir().unwrap();
        write_etc(dir.path(), "shadow", "root:*:18000:0:99999:7:::\n");
        let identity = CapturedIdentity {
            shadow: CapturedLines {
                root: Some("root:*:18000:0:99999:7:::".to_string()),
                user: Some("alice:$6$userhash:18000:0:99999:7:::".to_string()),
            },
            ..Default::default()
        };
        reconcile(dir.path(), &identity, "alice", false).unwrap();
        let contents = fs::read_to_string(dir.path().join("etc/shadow")).unwrap();
        let root_line = contents.lines().find(|l| l.starts_with("root:")).unwrap();
        assert_eq!(root_line.split(':').nth(1), Some("$6$userhash"));
    }
}

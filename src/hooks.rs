//! Post-install shell hook execution — an external collaborator per the
//! concurrency model: the core transaction only needs to know whether
//! hooks exist and, if so, run them as root.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::environment::{DefaultUser, Environment};
use crate::error::WslSwitchError;

const HOOKS_DIR: &str = "etc/wslswitch/hooks.d";

/// Lists executable hook scripts under `rootfs/etc/wslswitch/hooks.d`,
/// sorted by filename so hook ordering is deterministic.
pub fn discover(rootfs: &Path) -> Vec<std::path::PathBuf> {
    let dir = rootfs.join(HOOKS_DIR);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut hooks: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    hooks.sort();
    hooks
}

/// Runs every discovered hook with the default user temporarily switched
/// to root, restoring the original default user afterward regardless of
/// whether any hook fails.
pub fn run_post_install(
    rootfs: &Path,
    environment: &dyn Environment,
    no_hooks: bool,
) -> Result<(), WslSwitchError> {
    if no_hooks {
        return Ok(());
    }

    let hooks = discover(rootfs);
    if hooks.is_empty() {
        return Ok(());
    }

    let original_user = environment.get_default_user()?;
    let needs_root_switch = original_user.name != "root";
    if needs_root_switch {
        environment.set_default_user(&DefaultUser {
            uid: 0,
            gid: 0,
            name: "root".to_string(),
        })?;
    }

    let mut first_error = None;
    for hook in &hooks {
        info!(hook = %hook.display(), "running post-install hook");
        if let Err(e) = std::process::Command::new(hook).status() {
            warn!(hook = %hook.display(), error = %e, "post-install hook failed to launch");
            first_error.get_or_insert(WslSwitchError::Io {
                context: format!("running hook {}", hook.display()),
                source: e,
            });
        }
    }

    if needs_root_switch {
        environment.set_default_user(&original_user)?;
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FakeEnvironment;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn discover_is_empty_when_no_hooks_dir() {
        let dir = tempdir().unwrap();
        assert!(discover(dir.path()).is_empty());
    }

    #[test]
    fn discover_sorts_hook_files() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join(HOOKS_DIR);
        fs::create_dir_all(&hooks_dir).unwrap();
        fs::write(hooks_dir.join("20-second.sh"), b"#!/bin/sh\n").unwrap();
        fs::write(hooks_dir.join("10-first.sh"), b"#!/bin/sh\n").unwrap();
        let found = discover(dir.path());
        assert_eq!(
            found,
            vec![
                hooks_dir.join("10-first.sh"),
                hooks_dir.join("20-second.sh"),
            ]
        );
    }

    #[test]
    fn no_hooks_flag_short_circuits() {
        let dir = tempdir().unwrap();
        let env = FakeEnvironment::installed_at(PathBuf::from("C:\\fake"));
        run_post_install(dir.path(), &env, true).unwrap();
    }

    #[test]
    fn empty_hooks_dir_is_a_no_op() {
        let dir = tempdir().unwrap();
        let env = FakeEnvironment::installed_at(PathBuf::from("C:\\fake"));
        run_post_install(dir.path(), &env, false).unwrap();
    }
}

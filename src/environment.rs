//! Probing the WSL1 installation layout and reading/writing the default-user
//! registry key, behind a small trait so the core pipeline can run against
//! a fake on any host.

use std::path::{Path, PathBuf};

use crate::error::WslSwitchError;

#[derive(Debug, Clone)]
pub struct WslLocation {
    pub basedir: PathBuf,
    pub launcher_path: Option<PathBuf>,
    pub shell_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultUser {
    pub uid: u32,
    pub gid: u32,
    pub name: String,
}

pub trait Environment {
    /// Returns the resolved install location, or an error if nothing is
    /// installed or WSL currently appears to be running.
    fn probe(&self) -> Result<WslLocation, WslSwitchError>;
    fn get_default_user(&self) -> Result<DefaultUser, WslSwitchError>;
    fn set_default_user(&self, user: &DefaultUser) -> Result<(), WslSwitchError>;
}

/// `basedir/temp` (or its rename under newer layouts) existing and
/// non-empty is the coarse signal that an instance is currently running.
fn is_running(basedir: &Path) -> bool {
    let temp = basedir.join("temp");
    matches!(std::fs::read_dir(&temp), Ok(mut entries) if entries.next().is_some())
}

/// Tries each candidate in order; the first one containing a `rootfs`
/// directory wins. Mirrors the fixed ordered-probe idiom used for codec
/// detection in the archive reader — never driven by map iteration order.
pub fn probe_candidates(candidates: &[PathBuf]) -> Result<PathBuf, WslSwitchError> {
    for candidate in candidates {
        if candidate.join("rootfs").is_dir() {
            if is_running(candidate) {
                return Err(WslSwitchError::Running);
            }
            return Ok(candidate.clone());
        }
    }
    Err(WslSwitchError::NotInstalled)
}

/// The built-in basedir probe order: the legacy `%LocalAppData%\lxss`
/// layout, then the two Store-package `Packages\...\LocalState` layouts.
/// The older `WinSxS\...\lxss-installer\...` layout isn't guessed here —
/// its subpath is Windows-build-specific — but is reachable by overriding
/// `basedir_candidates` in `wslswitch.toml`.
pub fn default_basedir_candidates() -> Vec<PathBuf> {
    let local_app_data = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    vec![
        local_app_data.join("lxss"),
        local_app_data.join("Packages").join("CanonicalGroupLimited.UbuntuonWindows_79rhkp1fndgsc").join("LocalState"),
        local_app_data.join("Packages").join("CanonicalGroupLimited.Ubuntu_79rhkp1fndgsc").join("LocalState"),
    ]
}

#[cfg(windows)]
pub use windows_impl::WindowsEnvironment;

#[cfg(windows)]
mod windows_impl {
    use super::{default_basedir_candidates, probe_candidates, DefaultUser, Environment, WslLocation};
    use crate::error::WslSwitchError;
    use windows_registry::{Key, CURRENT_USER};

    const LXSS_KEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Lxss";

    pub struct WindowsEnvironment {
        basedir_candidates: Vec<std::path::PathBuf>,
    }

    impl WindowsEnvironment {
        pub fn new(basedir_candidates: Vec<std::path::PathBuf>) -> Self {
            Self { basedir_candidates }
        }

        pub fn with_defaults() -> Self {
            Self::new(default_basedir_candidates())
        }

        fn open_lxss_key(&self, writable: bool) -> Result<Key, WslSwitchError> {
            let result = if writable {
                CURRENT_USER.create(LXSS_KEY)
            } else {
                CURRENT_USER.open(LXSS_KEY)
            };
            result.map_err(|e| WslSwitchError::Io {
                context: format!("opening registry key {LXSS_KEY}"),
                source: std::io::Error::other(e.to_string()),
            })
        }
    }

    impl Environment for WindowsEnvironment {
        fn probe(&self) -> Result<WslLocation, WslSwitchError> {
            let basedir = probe_candidates(&self.basedir_candidates)?;
            Ok(WslLocation {
                basedir,
                launcher_path: None,
                shell_path: None,
            })
        }

        fn get_default_user(&self) -> Result<DefaultUser, WslSwitchError> {
            let key = self.open_lxss_key(false)?;
            let uid = key.get_u32("DefaultUid").unwrap_or(1000);
            let gid = key.get_u32("DefaultGid").unwrap_or(1000);
            let name = key.get_string("DefaultUsername").unwrap_or_default();
            Ok(DefaultUser { uid, gid, name })
        }

        fn set_default_user(&self, user: &DefaultUser) -> Result<(), WslSwitchError> {
            let key = self.open_lxss_key(true)?;
            key.set_u32("DefaultUid", user.uid).map_err(registry_err)?;
            key.set_u32("DefaultGid", user.gid).map_err(registry_err)?;
            key.set_string("DefaultUsername", &user.name).map_err(registry_err)?;
            Ok(())
        }
    }

    fn registry_err(e: windows_registry::Error) -> WslSwitchError {
        WslSwitchError::Io {
            context: "writing Lxss registry values".to_string(),
            source: std::io::Error::other(e.to_string()),
        }
    }
}

/// Fake used by tests and by non-Windows development builds.
pub struct FakeEnvironment {
    pub location: Result<WslLocation, WslSwitchError>,
    pub default_user: std::sync::Mutex<DefaultUser>,
}

impl FakeEnvironment {
    pub fn installed_at(basedir: PathBuf) -> Self {
        Self {
            location: Ok(WslLocation {
                basedir,
                launcher_path: None,
                shell_path: None,
            }),
            default_user: std::sync::Mutex::new(DefaultUser {
                uid: 1000,
                gid: 1000,
                name: "demo".to_string(),
            }),
        }
    }
}

impl Environment for FakeEnvironment {
    fn probe(&self) -> Result<WslLocation, WslSwitchError> {
        match &self.location {
            Ok(loc) => Ok(loc.clone()),
            Err(WslSwitchError::NotInstalled) => Err(WslSwitchError::NotInstalled),
            Err(WslSwitchError::Running) => Err(WslSwitchError::Running),
            Err(_) => Err(WslSwitchError::NotInstalled),
        }
    }

    fn get_default_user(&self) -> Result<DefaultUser, WslSwitchError> {
        Ok(self.default_user.lock().unwrap().clone())
    }

    fn set_default_user(&self, user: &DefaultUser) -> Result<(), WslSwitchError> {
        *self.default_user.lock().unwrap() = user.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn probe_candidates_picks_first_with_rootfs() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(b.join("rootfs")).unwrap();
        let result = probe_candidates(&[a, b.clone()]).unwrap();
        assert_eq!(result, b);
    }

    #[test]
    fn probe_candidates_not_installed_when_none_match() {
        let dir = tempdir().unwrap();
        let err = probe_candidates(&[dir.path().join("missing")]).unwrap_err();
        assert!(matches!(err, WslSwitchError::NotInstalled));
    }

    #[test]
    fn probe_candidates_detects_running() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base");
        std::fs::create_dir_all(base.join("rootfs")).unwrap();
        std::fs::create_dir_all(base.join("temp")).unwrap();
        std::fs::write(base.join("temp/lock"), b"x").unwrap();
        let err = probe_candidates(&[base]).unwrap_err();
        assert!(matches!(err, WslSwitchError::Running));
    }

    #[test]
    fn fake_environment_roundtrips_default_user() {
        let env = FakeEnvironment::installed_at(PathBuf::from("C:\\fake"));
        env.set_default_user(&DefaultUser {
            uid: 2000,
            gid: 2000,
            name: "root".to_string(),
        })
        .unwrap();
        assert_eq!(env.get_default_user().unwrap().name, "root");
    }
}

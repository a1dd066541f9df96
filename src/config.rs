//! On-disk `wslswitch.toml` configuration, covering the knobs the core
//! pipeline leaves as Open Questions: where to look for an installed WSL1
//! basedir, how long to let the filesystem settle between the backup and
//! promote renames, which label a freshly-discovered rootfs without a
//! `.switch_label` file is assumed to carry, and how to reconcile the root
//! shadow hash across a swap.

use std::path::{Path, PathBuf};

use facet::Facet;

use crate::environment;
use crate::error::WslSwitchError;

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct WslSwitchConfig {
    #[facet(default)]
    pub basedir_candidates: Vec<PathBuf>,
    #[facet(default = 1500)]
    pub promote_flush_delay_ms: u64,
    #[facet(default)]
    pub legacy_label: String,
    #[facet(default = true)]
    pub clear_root_shadow_on_missing_hash: bool,
    #[facet(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for WslSwitchConfig {
    fn default() -> Self {
        Self {
            basedir_candidates: environment::default_basedir_candidates(),
            promote_flush_delay_ms: 1500,
            legacy_label: "ubuntu_trusty".to_string(),
            clear_root_shadow_on_missing_hash: true,
            cache_dir: None,
        }
    }
}

impl WslSwitchConfig {
    /// Where downloaded archives are cached: `cache_dir` if set, otherwise
    /// the user's cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("wslswitch")
        })
    }

    fn validate(&self) -> Result<(), WslSwitchError> {
        if self.basedir_candidates.is_empty() {
            return Err(WslSwitchError::Validation {
                message: "basedir_candidates must not be empty".into(),
            });
        }
        if self.promote_flush_delay_ms > 60_000 {
            return Err(WslSwitchError::Validation {
                message: "promote_flush_delay_ms must be at most 60000".into(),
            });
        }
        let valid_label = !self.legacy_label.is_empty()
            && self
                .legacy_label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_label {
            return Err(WslSwitchError::Validation {
                message: format!(
                    "legacy_label must match [a-zA-Z0-9_-]+ (got '{}')",
                    self.legacy_label
                ),
            });
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<WslSwitchConfig, WslSwitchError> {
    let contents = std::fs::read_to_string(path).map_err(|source| WslSwitchError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: WslSwitchConfig =
        facet_toml::from_str(&contents).map_err(|e| WslSwitchError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    config.validate()?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise falls back to built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<WslSwitchConfig, WslSwitchError> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(WslSwitchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        WslSwitchConfig::default().validate().unwrap();
    }

    #[test]
    fn valid_legacy_labels() {
        for label in ["ubuntu_trusty", "debian-bookworm", "Alpine321"] {
            let mut cfg = WslSwitchConfig::default();
            cfg.legacy_label = label.to_string();
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn invalid_legacy_labels() {
        for label in ["", "has space", "../etc", "slash/in/it"] {
            let mut cfg = WslSwitchConfig::default();
            cfg.legacy_label = label.to_string();
            assert!(cfg.validate().is_err(), "expected '{}' to be rejected", label);
        }
    }

    #[test]
    fn rejects_empty_basedir_candidates() {
        let mut cfg = WslSwitchConfig::default();
        cfg.basedir_candidates.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_excessive_flush_delay() {
        let mut cfg = WslSwitchConfig::default();
        cfg.promote_flush_delay_ms = 120_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wslswitch.toml");
        std::fs::write(
            &path,
            "legacy_label = \"ubuntu_trusty\"\npromote_flush_delay_ms = 2000\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.promote_flush_delay_ms, 2000);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.legacy_label, "ubuntu_trusty");
    }
}

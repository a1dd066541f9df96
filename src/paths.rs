use std::path::PathBuf;

/// Default rootfs archive cache directory: `~/.cache/wslswitch/archives/`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wslswitch")
        .join("archives")
}

/// Default config file location, searched next to the current directory
/// first and falling back to the user's config directory.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from("wslswitch.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wslswitch")
        .join("wslswitch.toml")
}

/// Where `get` writes a downloaded archive when no `--output` is given:
/// the current directory.
pub fn default_get_output_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

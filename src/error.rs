use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WslSwitchError {
    #[error("the Linux subsystem is not installed")]
    #[diagnostic(help("go through the standard WSL installation procedure first"))]
    NotInstalled,

    #[error("the Linux subsystem is currently running")]
    #[diagnostic(help("close all WSL terminals/instances before continuing"))]
    Running,

    #[error("failed to open archive {path}: {message}")]
    ArchiveOpenError { path: String, message: String },

    #[error("entry {path} failed: {cause}")]
    EntryError { path: String, cause: String },

    #[error("every one of {total} entries in {path} failed to extract")]
    #[diagnostic(help("check that the archive is actually a valid ustar or SquashFS image"))]
    ExtractionTotalFailure { path: String, total: usize },

    #[error("extended attribute error on {path} ({name}): {os_status}")]
    XAttrError {
        path: String,
        name: String,
        os_status: String,
    },

    #[error("failed to rename {src} to {dst}: {os_status}")]
    RenameError {
        src: String,
        dst: String,
        os_status: String,
    },

    #[error("rollback failed, the installation is now broken")]
    #[diagnostic(help(
        "the rootfs directory may be missing; reinstall WSL or manually restore rootfs_<label> to rootfs"
    ))]
    RollbackFailed,

    #[error("malformed lxattrb attribute ({len} bytes, expected 56)")]
    MalformedAttribute { len: usize },

    #[error("leftover staging directory {path} could not be removed")]
    #[diagnostic(help("remove {path} manually and try again"))]
    LeftoverStaging { path: String },

    #[error("interrupted")]
    Interrupted,

    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("no catalog entry for image '{image}:{tag}'")]
    #[diagnostic(help("pass a tarball or .squashfs path instead, or check the image name/tag"))]
    CatalogMiss { image: String, tag: String },

    #[error("failed to download {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("the '{image}:{tag}' rootfs is already the current installation")]
    AlreadyActive { image: String, tag: String },

    #[error("the '{image}:{tag}' rootfs is not installed")]
    #[diagnostic(help("run `wslswitch install {image}:{tag}` first"))]
    NotInstalledSlot { image: String, tag: String },
}

//! The sole async boundary in the crate: resolving a bare `image[:tag]`
//! against the catalog and streaming its tarball into the cache directory
//! with progress reporting. Everything below this returns to synchronous
//! code.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use crate::catalog;
use crate::error::WslSwitchError;

async fn download_to_file(
    path: &Path,
    response: reqwest::Response,
    pb: &ProgressBar,
) -> Result<(), WslSwitchError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| WslSwitchError::Io {
            context: format!("creating temp file {}", path.display()),
            source: e,
        })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| WslSwitchError::DownloadFailed {
            url: path.display().to_string(),
            message: e.to_string(),
        })?;
        file.write_all(&chunk).await.map_err(|e| WslSwitchError::Io {
            context: "writing archive data".into(),
            source: e,
        })?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await.map_err(|e| WslSwitchError::Io {
        context: "flushing archive file".into(),
        source: e,
    })?;

    Ok(())
}

/// Splits `image[:tag]` into its two parts.
pub fn split_image_tag(source: &str) -> (&str, Option<&str>) {
    match source.split_once(':') {
        Some((image, tag)) => (image, Some(tag)),
        None => (source, None),
    }
}

/// If `source` is an existing file path, returns it unchanged. Otherwise
/// resolves it against the catalog and downloads to `cache_dir`, re-using
/// an already-downloaded file by name.
pub async fn ensure_archive(source: &str, cache_dir: &Path) -> Result<PathBuf, WslSwitchError> {
    let as_path = PathBuf::from(source);
    if as_path.exists() {
        return Ok(as_path);
    }

    let (image, tag) = split_image_tag(source);
    let entry = catalog::resolve(image, tag).ok_or_else(|| WslSwitchError::CatalogMiss {
        image: image.to_string(),
        tag: tag.unwrap_or("latest").to_string(),
    })?;

    tokio::fs::create_dir_all(cache_dir)
        .await
        .map_err(|e| WslSwitchError::Io {
            context: format!("creating cache dir {}", cache_dir.display()),
            source: e,
        })?;

    let filename = entry.url.rsplit('/').next().unwrap_or("rootfs.tar");
    let dest = cache_dir.join(filename);
    if dest.exists() {
        tracing::info!(path = %dest.display(), "using cached archive");
        return Ok(dest);
    }

    tracing::info!(url = entry.url, label = entry.label, "downloading rootfs archive");

    let response = reqwest::get(entry.url)
        .await
        .map_err(|e| WslSwitchError::DownloadFailed {
            url: entry.url.to_string(),
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(WslSwitchError::DownloadFailed {
            url: entry.url.to_string(),
            message: format!("HTTP {}", response.status()),
        });
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let tmp_path = dest.with_extension("part");
    let _ = tokio::fs::remove_file(&tmp_path).await;

    if let Err(e) = download_to_file(&tmp_path, response, &pb).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&tmp_path, &dest)
        .await
        .map_err(|e| WslSwitchError::Io {
            context: format!("renaming {} to {}", tmp_path.display(), dest.display()),
            source: e,
        })?;

    pb.finish_with_message("download complete");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_image_and_tag() {
        assert_eq!(split_image_tag("ubuntu:noble"), ("ubuntu", Some("noble")));
        assert_eq!(split_image_tag("ubuntu"), ("ubuntu", None));
    }

    #[tokio::test]
    async fn local_path_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.tar.gz");
        std::fs::write(&path, b"fake archive").unwrap();
        let resolved = ensure_archive(path.to_str().unwrap(), dir.path()).await.unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn unknown_catalog_entry_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_archive("nonexistent-distro:latest", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WslSwitchError::CatalogMiss { .. }));
    }
}

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Blocking HTTP downloader. Bodies are streamed into a `.part` file next to the
/// destination and renamed into place once complete.
pub struct Downloader {
    client: reqwest::blocking::Client,
}

impl Downloader {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut res = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::msg(format!("download of {url} failed: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "download of {url} failed with status {}",
                res.status()
            )));
        }

        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)
            .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", dir.display())))?;
        let file_name = dest
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".into());
        let mut part = tempfile::Builder::new()
            .prefix(&format!("{file_name}."))
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| Error::msg(format!("failed to create temp file in {}: {e}", dir.display())))?;

        let n = io::copy(&mut res, part.as_file_mut())
            .map_err(|e| Error::msg(format!("failed while downloading {url}: {e}")))?;
        part.persist(dest)
            .map_err(|e| Error::msg(format!("failed to move download to {}: {}", dest.display(), e.error)))?;
        Ok(n)
    }
}

/// Copy `src` to `dest`, creating parent directories.
pub fn copy_file(src: &Path, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::msg(format!("failed to create dir {}: {e}", parent.display()))
        })?;
    }
    fs::copy(src, dest).map_err(|e| {
        Error::msg(format!(
            "failed to copy {} -> {}: {e}",
            src.display(),
            dest.display()
        ))
    })
}

/// Where an archive was obtained from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Already present in the source directory.
    Present,
    /// Copied from the local cache.
    Cache,
    /// Downloaded from the given URL.
    Network(String),
}

/// Make `dest` exist: reuse it, restore it from `cache_dir`, or download it from `url`.
/// A fresh download is copied back into the cache.
pub fn obtain(
    downloader: &Downloader,
    url: &str,
    dest: &Path,
    cache_dir: Option<&Path>,
) -> Result<Origin> {
    if dest.is_file() {
        return Ok(Origin::Present);
    }
    let cached = cache_dir.zip(dest.file_name()).map(|(dir, name)| dir.join(name));
    if let Some(c) = cached.as_deref().filter(|c| c.is_file()) {
        copy_file(c, dest)?;
        return Ok(Origin::Cache);
    }
    downloader.fetch(url, dest)?;
    if let Some(c) = cached.as_deref() {
        copy_file(dest, c)?;
    }
    Ok(Origin::Network(url.to_string()))
}

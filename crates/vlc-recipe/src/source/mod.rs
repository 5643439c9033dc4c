//! Upstream archive acquisition: naming, download, integrity check, extraction, patching.

pub mod download;
pub mod extract;
pub mod patch;
pub mod verify;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::recipe::Recipe;
use crate::settings::Os;

pub const DEFAULT_MIRROR: &str = "http://download.videolan.org/pub/videolan/vlc";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mirror: String,
    /// Local archive cache keyed by file name. Accepts `@alias` workspace paths.
    pub cache_dir: Option<String>,
    /// Directory holding `<archive>.md5` files, relative to the recipe profile.
    pub hash_dir: String,
    /// Download `<url>.md5` when no local hash file exists.
    pub fetch_hash_sidecar: bool,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.into(),
            cache_dir: None,
            hash_dir: "md5sums".into(),
            fetch_hash_sidecar: true,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    SevenZip,
    Unknown,
}

impl ArchiveFormat {
    pub fn from_filename(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            ArchiveFormat::TarXz
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveFormat::TarGz
        } else if name.ends_with(".tar") {
            ArchiveFormat::Tar
        } else if name.ends_with(".7z") {
            ArchiveFormat::SevenZip
        } else {
            ArchiveFormat::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::SevenZip => "7z",
            ArchiveFormat::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub filename: String,
    pub url: String,
    /// Where the published md5 for this archive is expected locally.
    pub hash_file: PathBuf,
    pub format: ArchiveFormat,
}

impl ArchiveDescriptor {
    pub fn new(
        name: &str,
        version: &str,
        os: Os,
        mirror: &str,
        hash_dir: &Path,
    ) -> Self {
        let filename = archive_filename(name, version, os);
        let url = archive_url(mirror, name, version, os);
        Self {
            hash_file: hash_dir.join(format!("{filename}.md5")),
            format: ArchiveFormat::from_filename(&filename),
            filename,
            url,
        }
    }

    pub fn for_recipe(recipe: &Recipe, cfg: &SourceConfig, profile_dir: &Path) -> Self {
        Self::new(
            &recipe.meta.name,
            &recipe.meta.version,
            recipe.settings.os,
            &cfg.mirror,
            &profile_dir.join(&cfg.hash_dir),
        )
    }

    /// The md5 published next to the archive on the mirror.
    pub fn sidecar_url(&self) -> String {
        format!("{}.md5", self.url)
    }
}

pub fn archive_filename(name: &str, version: &str, os: Os) -> String {
    match os {
        Os::Linux => format!("{name}-{version}.tar.xz"),
        Os::Windows => format!("{name}-{version}-win64.7z"),
    }
}

pub fn archive_url(mirror: &str, name: &str, version: &str, os: Os) -> String {
    let mirror = mirror.trim_end_matches('/');
    let file = archive_filename(name, version, os);
    match os {
        Os::Linux => format!("{mirror}/{version}/{file}"),
        Os::Windows => format!("{mirror}/{version}/win64/{file}"),
    }
}

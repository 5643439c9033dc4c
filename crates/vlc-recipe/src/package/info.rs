//! Metadata published to consumers of the package.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::Os;

pub const INFO_FILE: &str = "package_info.json";

const LIB_EXTENSIONS: &[&str] = &["so", "a", "lib", "dylib", "bc"];

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W").expect("non-word pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub libs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub bin_dirs: Vec<String>,
    /// Variables to set in consumers, e.g. `PKG_CONFIG_LIBVLC_PREFIX`.
    pub env: BTreeMap<String, String>,
    /// Entries to append to the consumer's `PKG_CONFIG_PATH`.
    pub pkg_config_path: Vec<String>,
}

/// Library names found directly in `<package>/lib`, as a linker would want them:
/// `libvlc.so` is `vlc`, while `libvlc.lib` keeps its name.
pub fn collect_libs(package_dir: &Path) -> Result<Vec<String>> {
    let lib_dir = package_dir.join("lib");
    if !lib_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(&lib_dir)
        .map_err(|e| Error::msg(format!("failed to list {}: {e}", lib_dir.display())))?;

    let mut libs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| Error::msg(format!("failed to list {}: {e}", lib_dir.display())))?
            .path();
        if !path.is_file() {
            continue;
        }
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if !LIB_EXTENSIONS.contains(&ext) {
            continue;
        }
        let name = match stem.strip_prefix("lib") {
            Some(rest) if ext != "lib" && !rest.is_empty() => rest,
            _ => stem,
        };
        libs.push(name.to_string());
    }
    libs.sort();
    libs.dedup();
    Ok(libs)
}

/// `libfoo-1.0.pc` -> `PKG_CONFIG_LIBFOO_1_0_PREFIX`.
pub fn pc_env_var_name(pc_file_name: &str) -> String {
    let stem = pc_file_name.strip_suffix(".pc").unwrap_or(pc_file_name);
    let name = NON_WORD.replace_all(&stem.to_uppercase(), "_").into_owned();
    format!("PKG_CONFIG_{name}_PREFIX")
}

/// Path as published for `os`: forward slashes for Windows targets.
pub fn publish_path(path: &Path, os: Os) -> String {
    let s = path.display().to_string();
    match os {
        Os::Windows => s.replace('\\', "/"),
        Os::Linux => s,
    }
}

pub fn pc_files(package_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = package_dir.join("lib").join("pkgconfig").join("*.pc");
    let pattern = pattern.to_string_lossy();
    let mut out = Vec::new();
    for entry in glob::glob(&pattern)
        .map_err(|e| Error::msg(format!("invalid glob '{pattern}': {e}")))?
    {
        out.push(entry.map_err(|e| Error::msg(format!("glob error: {e}")))?);
    }
    out.sort();
    Ok(out)
}

pub fn scan(package_dir: &Path, os: Os) -> Result<PackageInfo> {
    let mut info = PackageInfo {
        libs: collect_libs(package_dir)?,
        lib_dirs: vec!["lib".into()],
        include_dirs: vec!["include".into()],
        bin_dirs: vec!["bin".into()],
        ..Default::default()
    };

    let prefix = publish_path(package_dir, os);
    for pc in pc_files(package_dir)? {
        if let Some(name) = pc.file_name().and_then(|s| s.to_str()) {
            info.env.insert(pc_env_var_name(name), prefix.clone());
        }
    }
    let pc_dir = publish_path(&package_dir.join("lib").join("pkgconfig"), os);
    if !info.pkg_config_path.contains(&pc_dir) {
        info.pkg_config_path.push(pc_dir);
    }
    Ok(info)
}

pub fn write(package_dir: &Path, info: &PackageInfo) -> Result<PathBuf> {
    let path = package_dir.join(INFO_FILE);
    let s = serde_json::to_string_pretty(info)?;
    fs::write(&path, s)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    Ok(path)
}

pub fn read(package_dir: &Path) -> Result<PackageInfo> {
    let path = package_dir.join(INFO_FILE);
    let raw = fs::read_to_string(&path)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&raw)?)
}

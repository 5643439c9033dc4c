use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_build_dir() -> String {
    "build".into()
}

fn default_out_dir() -> String {
    "out".into()
}

fn default_root_dir() -> String {
    ".".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanMode {
    #[default]
    None,
    Build,
    Out,
    All,
}

impl CleanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanMode::None => "none",
            CleanMode::Build => "build",
            CleanMode::Out => "out",
            CleanMode::All => "all",
        }
    }
}

/// `[workspace]`: where sources are unpacked (`build_dir`) and packages land (`out_dir`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root_dir: String,
    pub build_dir: String,
    pub out_dir: String,
    pub paths: BTreeMap<String, String>,
    pub clean: CleanMode,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            build_dir: default_build_dir(),
            out_dir: default_out_dir(),
            paths: BTreeMap::new(),
            clean: CleanMode::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub out_dir: PathBuf,
    pub named_dirs: BTreeMap<String, PathBuf>,
}

impl WorkspacePaths {
    // `@alias/...` expands from `[workspace.paths]`, absolute paths are kept,
    // anything else is rooted at the workspace root.
    pub fn resolve_config_path(&self, raw: &str) -> Result<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::msg("empty path"));
        }

        if let Some(after_at) = raw.strip_prefix('@') {
            let (alias, rest) = match after_at.split_once('/') {
                Some((a, r)) => (a.trim(), Some(r)),
                None => (after_at.trim(), None),
            };
            let base = self.named_dirs.get(alias).ok_or_else(|| {
                let known = self.named_dirs.keys().cloned().collect::<Vec<_>>().join(", ");
                Error::msg(format!(
                    "unknown workspace path alias '{}' in '{}' (known: {})",
                    alias, raw, known
                ))
            })?;
            return Ok(match rest {
                Some(r) if !r.is_empty() => base.join(r),
                _ => base.clone(),
            });
        }

        let pb = PathBuf::from(raw);
        Ok(if pb.is_absolute() { pb } else { self.root.join(pb) })
    }
}

pub fn load_paths(cfg: &WorkspaceConfig) -> Result<WorkspacePaths> {
    let cwd = std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))?;
    let root = resolve_user_path(&cwd, &cfg.root_dir)?;
    let build_dir = resolve_user_dir(&root, &cfg.build_dir)?;
    let out_dir = resolve_user_dir(&root, &cfg.out_dir)?;
    let named_dirs = resolve_named_dirs(&root, &build_dir, &out_dir, &cfg.paths)?;
    Ok(WorkspacePaths {
        root,
        build_dir,
        out_dir,
        named_dirs,
    })
}

pub fn init_dirs(cfg: &WorkspaceConfig) -> Result<WorkspacePaths> {
    let paths = load_paths(cfg)?;

    match cfg.clean {
        CleanMode::None => {}
        CleanMode::Build => safe_remove_dir_all(&paths.root, &paths.build_dir)?,
        CleanMode::Out => safe_remove_dir_all(&paths.root, &paths.out_dir)?,
        CleanMode::All => {
            safe_remove_dir_all(&paths.root, &paths.build_dir)?;
            safe_remove_dir_all(&paths.root, &paths.out_dir)?;
        }
    }

    for dir in [&paths.build_dir, &paths.out_dir] {
        fs::create_dir_all(dir)
            .map_err(|e| Error::msg(format!("failed to create {}: {e}", dir.display())))?;
    }
    Ok(paths)
}

fn resolve_user_dir(root: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace dir"));
    }
    if Path::new(p)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::msg(format!(
            "invalid workspace dir '{}' (contains '..')",
            p
        )));
    }
    let pb = PathBuf::from(p);
    Ok(if pb.is_absolute() { pb } else { root.join(pb) })
}

fn resolve_user_path(base: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace path"));
    }
    let pb = PathBuf::from(p);
    Ok(if pb.is_absolute() { pb } else { base.join(pb) })
}

fn resolve_named_dirs(
    root: &Path,
    build_dir: &Path,
    out_dir: &Path,
    paths: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut out = BTreeMap::<String, PathBuf>::new();
    out.insert("root".into(), root.to_path_buf());
    out.insert("build".into(), build_dir.to_path_buf());
    out.insert("out".into(), out_dir.to_path_buf());

    for (name, raw) in paths {
        let key = name.trim();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::msg(format!(
                "workspace.paths key '{}' is invalid (allowed: a-zA-Z0-9_-)",
                key
            )));
        }
        if out.contains_key(key) {
            return Err(Error::msg(format!(
                "workspace.paths key '{}' is reserved",
                key
            )));
        }
        out.insert(key.to_string(), resolve_user_path(root, raw)?);
    }
    Ok(out)
}

fn safe_remove_dir_all(root: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let root_can = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let dir_can = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !dir_can.starts_with(&root_can) || dir_can == root_can {
        return Err(Error::msg(format!(
            "refusing to remove '{}' (outside workspace root '{}')",
            dir_can.display(),
            root_can.display()
        )));
    }
    fs::remove_dir_all(&dir_can)
        .map_err(|e| Error::msg(format!("failed to remove dir {}: {e}", dir_can.display())))
}

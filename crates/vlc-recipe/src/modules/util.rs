use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::executor::ExecCtx;
use crate::recipe::Recipe;

/// `<name>-<version>`, the per-recipe directory under the build and out dirs.
pub fn recipe_slug(recipe: &Recipe) -> String {
    format!("{}-{}", recipe.meta.name, recipe.meta.version)
}

/// Recipe bookkeeping (requirements, run metadata).
pub fn run_dir(doc: &ConfigDoc, ctx: &mut ExecCtx, recipe: &Recipe) -> Result<PathBuf> {
    let ws = ctx.workspace_paths_or_init(doc)?;
    Ok(ws.out_dir.join(recipe_slug(recipe)).join("recipe"))
}

/// Where the archive is downloaded and unpacked.
pub fn source_dir(doc: &ConfigDoc, ctx: &mut ExecCtx, recipe: &Recipe) -> Result<PathBuf> {
    let ws = ctx.workspace_paths_or_init(doc)?;
    Ok(ws.build_dir.join(recipe_slug(recipe)).join("source"))
}

/// The unpacked and renamed upstream tree, `<source_dir>/<name>`.
pub fn source_tree(doc: &ConfigDoc, ctx: &mut ExecCtx, recipe: &Recipe) -> Result<PathBuf> {
    Ok(source_dir(doc, ctx, recipe)?.join(recipe.canonical_dir_name()))
}

/// The package folder handed to consumers.
pub fn package_dir(doc: &ConfigDoc, ctx: &mut ExecCtx, recipe: &Recipe) -> Result<PathBuf> {
    let ws = ctx.workspace_paths_or_init(doc)?;
    Ok(ws.out_dir.join(recipe_slug(recipe)).join("package"))
}

/// Resolve a configured path: `@alias/...` workspace paths, absolute paths as-is,
/// anything else relative to the recipe profile.
pub fn resolve_profile_path(doc: &ConfigDoc, ctx: &mut ExecCtx, raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::msg("path is empty"));
    }
    if raw.starts_with('@') {
        let ws = ctx.workspace_paths_or_init(doc)?;
        return ws.resolve_config_path(raw);
    }
    let p = PathBuf::from(raw);
    Ok(if p.is_absolute() { p } else { doc.base_dir().join(p) })
}

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    if let Some(parent) = p.parent() {
        ensure_dir(parent)?;
    }
    fs::write(p, s).map_err(|e| Error::msg(format!("failed to write {}: {e}", p.display())))
}

pub fn write_json_pretty(p: &Path, v: &serde_json::Value) -> Result<()> {
    let s = serde_json::to_string_pretty(v)
        .map_err(|e| Error::msg(format!("json encode error: {e}")))?;
    write_text(p, &s)
}

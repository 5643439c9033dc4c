use std::path::{Path, PathBuf};

use serde::Deserialize;

use vlc_recipe_macros::{Module, Task};

use crate::config::ConfigDoc;
use crate::executor::ExecCtx;
use crate::modules::util;
use crate::recipe::Recipe;
use crate::settings::Os;
use crate::source::download::{self, Downloader, Origin};
use crate::source::extract::{self, Extraction};
use crate::source::patch::{self, PatchOutcome};
use crate::source::{ArchiveDescriptor, SourceConfig, verify};
use crate::{Error, Result};

fn default_true() -> bool {
    true
}

fn source_config(doc: &ConfigDoc) -> Result<SourceConfig> {
    Ok(doc.deserialize_path("source")?.unwrap_or_default())
}

fn descriptor(doc: &ConfigDoc, recipe: &Recipe) -> Result<ArchiveDescriptor> {
    Ok(ArchiveDescriptor::for_recipe(
        recipe,
        &source_config(doc)?,
        &doc.base_dir(),
    ))
}

/// The md5 file to check against: the profile's hash dir first, then a downloaded
/// sidecar next to the archive.
fn hash_file(desc: &ArchiveDescriptor, source_dir: &Path) -> Option<PathBuf> {
    if desc.hash_file.is_file() {
        return Some(desc.hash_file.clone());
    }
    let sidecar = source_dir.join(format!("{}.md5", desc.filename));
    sidecar.is_file().then_some(sidecar)
}

#[Task(
    id = "source.fetch",
    module = "source",
    phase = "fetch",
    provides = ["source:archive"],
    after = ["core.init", "recipe:prerequisites?"],
    default_label = "Fetch upstream archive",
    core = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for FetchTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl FetchTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        let cfg = source_config(doc)?;
        let desc = descriptor(doc, recipe)?;
        let dir = util::source_dir(doc, ctx, recipe)?;
        util::ensure_dir(&dir)?;
        let cache = cfg
            .cache_dir
            .as_deref()
            .map(|c| util::resolve_profile_path(doc, ctx, c))
            .transpose()?;

        let downloader = Downloader::new(cfg.timeout_secs)?;
        let dest = dir.join(&desc.filename);
        ctx.log(&format!("Downloading file {}", desc.url));
        match download::obtain(&downloader, &desc.url, &dest, cache.as_deref())? {
            Origin::Present => ctx.log(&format!("using existing {}", dest.display())),
            Origin::Cache => ctx.log(&format!("restored {} from cache", desc.filename)),
            Origin::Network(url) => {
                ctx.log(&format!("downloaded {url}"));
                if let Some(c) = cache.as_deref() {
                    ctx.log(&format!("cached in {}", c.display()));
                }
            }
        }

        if hash_file(&desc, &dir).is_none() && cfg.fetch_hash_sidecar {
            let sidecar = dir.join(format!("{}.md5", desc.filename));
            let url = desc.sidecar_url();
            ctx.log(&format!(
                "no local {} found; fetching {url}",
                desc.hash_file.display()
            ));
            downloader.fetch(&url, &sidecar)?;
        }
        Ok(())
    }
}

#[Task(
    id = "source.verify",
    module = "source",
    phase = "verify",
    provides = ["source:verified"],
    after = ["source:archive"],
    default_label = "Verify archive checksum",
    core = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifyTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for VerifyTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl VerifyTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        let desc = descriptor(doc, recipe)?;
        let dir = util::source_dir(doc, ctx, recipe)?;
        let Some(hashes) = hash_file(&desc, &dir) else {
            return Err(Error::msg(format!(
                "no md5 published for {} (looked for {} and the downloaded sidecar)",
                desc.filename,
                desc.hash_file.display()
            )));
        };
        let md5 = verify::verify_archive(&dir.join(&desc.filename), &hashes)?;
        ctx.log(&format!("md5 ok: {md5}  {}", desc.filename));
        Ok(())
    }
}

#[Task(
    id = "source.extract",
    module = "source",
    phase = "extract",
    provides = ["source:tree"],
    after = ["source:verified"],
    default_label = "Extract archive",
    core = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for ExtractTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl ExtractTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        let desc = descriptor(doc, recipe)?;
        let dir = util::source_dir(doc, ctx, recipe)?;
        if let Some(tree) = extract_source(ctx, recipe, &desc, &dir, Os::host())? {
            ctx.log(&format!("source tree: {}", tree.display()));
        }
        Ok(())
    }
}

/// Unpack `<dir>/<archive>` and rename its top-level directory. Archives the
/// in-process path cannot read go to the `host` extractor; with no extractor the
/// task is skipped and `None` returned.
fn extract_source(
    ctx: &mut ExecCtx,
    recipe: &Recipe,
    desc: &ArchiveDescriptor,
    dir: &Path,
    host: Option<Os>,
) -> Result<Option<PathBuf>> {
    let archive = dir.join(&desc.filename);
    extract::remove_dir_if_exists(&dir.join(recipe.canonical_dir_name()))?;
    extract::remove_dir_if_exists(&dir.join(recipe.upstream_dir_name()))?;

    ctx.log(&format!("Extracting {}", desc.filename));
    let format = match extract::unpack(&archive, desc.format, dir)? {
        Extraction::Done => None,
        Extraction::Unsupported(format) => Some(format),
        Extraction::Mismatch { format, reason } => {
            ctx.warn(&format!(
                "{} is not a valid {} archive ({reason}); trying the host extractor",
                desc.filename,
                format.as_str()
            ));
            extract::remove_dir_if_exists(&dir.join(recipe.upstream_dir_name()))?;
            Some(format)
        }
    };
    if let Some(format) = format {
        let Some(cmd) = extract::fallback_command(host, &archive, dir) else {
            ctx.skip(format!(
                "do not know how to extract {} ({} archive) on this host",
                desc.filename,
                format.as_str()
            ));
            return Ok(None);
        };
        ctx.run_cmd(cmd)?;
    }

    let tree = extract::rename_top_level(
        dir,
        &recipe.upstream_dir_name(),
        recipe.canonical_dir_name(),
    )?;
    Ok(Some(tree))
}

#[Task(
    id = "source.patch",
    module = "source",
    phase = "patch",
    provides = ["source:patched"],
    after = ["source:tree"],
    default_label = "Patch source",
    core = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatchTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for PatchTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl PatchTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        if recipe.settings.os != Os::Windows {
            ctx.log(&format!(
                "no source patches for {} targets",
                recipe.settings.os.as_str()
            ));
            return Ok(());
        }
        let tree = util::source_tree(doc, ctx, recipe)?;
        for (file, outcome) in patch::apply_all(&tree, recipe.profile.patches)? {
            let shown = file.strip_prefix(&tree).unwrap_or(&file).display().to_string();
            match outcome {
                PatchOutcome::NoMatch => {
                    ctx.warn(&format!("{shown}: expected text not found, left unchanged"))
                }
                other => ctx.log(&format!("{shown}: {}", other.as_str())),
            }
        }
        Ok(())
    }
}

#[Module(
    id = "source",
    tasks = [FetchTask, VerifyTask, ExtractTask, PatchTask]
)]
pub struct SourceModule;

use serde::Deserialize;

use vlc_recipe_macros::{Module, Task};

use crate::Result;
use crate::build;
use crate::config::ConfigDoc;
use crate::executor::ExecCtx;
use crate::modules::build::{prepare, require_autotools};
use crate::modules::util;
use crate::package::{self, SDK_COPY_RULES, info};
use crate::recipe::Recipe;

fn default_true() -> bool {
    true
}

#[Task(
    id = "package.install",
    module = "package",
    phase = "package",
    provides = ["package:files"],
    after = ["build:installed"],
    default_label = "Install into package folder",
    core = true,
    gate = "builds_from_source",
    dry_run = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for InstallTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl InstallTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        if !require_autotools(recipe, ctx) {
            return Ok(());
        }
        let (_, env) = prepare(doc, ctx, recipe)?;
        let tree = util::source_tree(doc, ctx, recipe)?;
        ctx.run_cmd(build::install_step().command(&tree, &env))
    }
}

#[Task(
    id = "package.sdk",
    module = "package",
    phase = "package",
    provides = ["package:files"],
    after = ["source:ready"],
    default_label = "Copy prebuilt SDK",
    core = true,
    gate = "just_downloading"
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SdkTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for SdkTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl SdkTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        let tree = util::source_tree(doc, ctx, recipe)?;
        let package_dir = util::package_dir(doc, ctx, recipe)?;
        util::ensure_dir(&package_dir)?;
        for rule in SDK_COPY_RULES {
            let copied = package::copy_matching(&tree, rule, &package_dir)?;
            let from = if rule.from.is_empty() {
                recipe.canonical_dir_name().to_string()
            } else {
                format!("{}/{}", recipe.canonical_dir_name(), rule.from)
            };
            ctx.log(&format!(
                "copied {} file(s) matching '{}' from {from} to {}",
                copied.len(),
                rule.pattern,
                rule.to
            ));
        }
        Ok(())
    }
}

#[Task(
    id = "package.info",
    module = "package",
    phase = "info",
    provides = ["package:info"],
    after = ["package:files"],
    default_label = "Publish consumer metadata",
    core = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfoTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for InfoTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl InfoTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        let package_dir = util::package_dir(doc, ctx, recipe)?;
        if !package_dir.is_dir() {
            ctx.skip(format!("no package folder at {}", package_dir.display()));
            return Ok(());
        }
        let meta = info::scan(&package_dir, recipe.settings.os)?;
        ctx.log(&format!("libs: {}", meta.libs.join(" ")));
        for (k, v) in &meta.env {
            ctx.log(&format!("env: {k}={v}"));
        }
        for p in &meta.pkg_config_path {
            ctx.log(&format!("PKG_CONFIG_PATH += {p}"));
        }
        let path = info::write(&package_dir, &meta)?;
        ctx.log(&format!("wrote {}", path.display()));
        Ok(())
    }
}

#[Module(id = "package", tasks = [InstallTask, SdkTask, InfoTask])]
pub struct PackageModule;

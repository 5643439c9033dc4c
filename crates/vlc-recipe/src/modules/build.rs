use std::path::PathBuf;

use serde::Deserialize;

use vlc_recipe_macros::{Module, Task};

use crate::Result;
use crate::build::{self, BuildConfig, BuildEnv};
use crate::config::ConfigDoc;
use crate::executor::ExecCtx;
use crate::modules::util;
use crate::recipe::{Recipe, Strategy};

fn default_true() -> bool {
    true
}

/// `[build]` plus the environment every build command runs under.
pub(crate) fn prepare(
    doc: &ConfigDoc,
    ctx: &mut ExecCtx,
    recipe: &Recipe,
) -> Result<(BuildConfig, BuildEnv)> {
    let cfg: BuildConfig = doc.deserialize_path("build")?.unwrap_or_default();
    let pc_paths = cfg
        .pkg_config_path
        .iter()
        .map(|p| util::resolve_profile_path(doc, ctx, p))
        .collect::<Result<Vec<PathBuf>>>()?;
    let env = build::build_env(recipe, &cfg, BuildEnv::from_process(), &pc_paths)?;
    Ok((cfg, env))
}

/// Skip the current task unless the recipe builds with autotools. Returns whether
/// the task should go on.
pub(crate) fn require_autotools(recipe: &Recipe, ctx: &mut ExecCtx) -> bool {
    match recipe.strategy() {
        Strategy::Autotools => true,
        Strategy::Unsupported { reason } => {
            ctx.skip(format!("unsupported configuration: {reason}"));
            false
        }
        Strategy::SdkCopy => {
            ctx.skip("download-only configuration; nothing to build");
            false
        }
    }
}

#[Task(
    id = "build.autotools",
    module = "build",
    phase = "build",
    provides = ["build:installed"],
    after = ["source:ready"],
    default_label = "Bootstrap, configure, make, install",
    core = true,
    gate = "builds_from_source",
    dry_run = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutotoolsTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for AutotoolsTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl AutotoolsTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        if !require_autotools(recipe, ctx) {
            return Ok(());
        }
        let (cfg, env) = prepare(doc, ctx, recipe)?;
        let tree = util::source_tree(doc, ctx, recipe)?;
        let package_dir = util::package_dir(doc, ctx, recipe)?;
        if !ctx.dry_run {
            util::ensure_dir(&package_dir)?;
        }

        let args = build::configure_args(recipe, &cfg, &package_dir);
        ctx.log("Pkg-Config vars in environment:");
        for (k, v) in env.pkg_config_vars() {
            ctx.log(&format!(" - {k}={v}"));
        }
        ctx.log(&format!("Configure arguments: {}", args.join(" ")));

        for step in build::autotools_steps(args, cfg.make_jobs()) {
            ctx.run_cmd(step.command(&tree, &env))?;
        }
        Ok(())
    }
}

#[Module(id = "build", tasks = [AutotoolsTask])]
pub struct BuildModule;

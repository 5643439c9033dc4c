use serde::Deserialize;
use serde_json::json;

use vlc_recipe_macros::{Module, Task};

use crate::Result;
use crate::config::ConfigDoc;
use crate::executor::ExecCtx;
use crate::modules::util;
use crate::recipe::Recipe;
use crate::system::{self, BUILD_PREREQUISITES, SYSTEM_PREREQUISITES, SystemPackageTool};

fn default_true() -> bool {
    true
}

#[Task(
    id = "recipe.requirements",
    module = "recipe",
    phase = "requirements",
    provides = ["recipe:requirements"],
    after = ["core.init"],
    default_label = "Declare requirements",
    core = true,
    dry_run = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequirementsTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
}

impl Default for RequirementsTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
        }
    }
}

impl RequirementsTask {
    pub fn run(_cfg: &Self, recipe: &Recipe, doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        ctx.log(&format!(
            "{}/{} ({})",
            recipe.meta.name, recipe.meta.version, recipe.settings
        ));
        ctx.log(&format!("strategy: {}", recipe.strategy()));
        for opt in &recipe.dropped_options {
            ctx.warn(&format!(
                "option '{opt}' does not exist for {} {}; ignored",
                recipe.meta.version, recipe.settings
            ));
        }

        let requirements = recipe.requirements();
        for r in &requirements {
            ctx.log(&r.to_string());
        }
        if ctx.dry_run {
            return Ok(());
        }

        let dir = util::run_dir(doc, ctx, recipe)?;
        util::write_json_pretty(
            &dir.join("requirements.json"),
            &json!({
                "recipe": recipe.meta,
                "settings": recipe.settings.to_string(),
                "options": recipe.options,
                "strategy": recipe.strategy().to_string(),
                "requirements": requirements,
            }),
        )
    }
}

#[Task(
    id = "recipe.prerequisites",
    module = "recipe",
    phase = "prerequisites",
    config_path = "prerequisites",
    provides = ["recipe:prerequisites"],
    after = ["core.init", "recipe.requirements"],
    default_label = "Install host prerequisites",
    dry_run = true
)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrerequisitesTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub label: Option<String>,
    /// Prefix installer commands with `sudo` unless already root.
    #[serde(default = "default_true")]
    pub sudo: bool,
}

impl Default for PrerequisitesTask {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
            sudo: true,
        }
    }
}

impl PrerequisitesTask {
    pub fn run(cfg: &Self, _recipe: &Recipe, _doc: &ConfigDoc, ctx: &mut ExecCtx) -> Result<()> {
        let Some(distro) = system::detect_distro() else {
            ctx.skip("unsupported package installer: host has no os-release");
            return Ok(());
        };
        let Some(installer) = system::installer_for(&distro) else {
            ctx.skip(format!(
                "unsupported package installer on distro '{}'",
                distro.id
            ));
            return Ok(());
        };
        let tool = SystemPackageTool::new(installer, cfg.sudo);

        for (kind, packages) in [
            ("build", BUILD_PREREQUISITES),
            ("system", SYSTEM_PREREQUISITES),
        ] {
            let missing = if ctx.dry_run {
                packages.to_vec()
            } else {
                tool.missing(packages)
            };
            if missing.is_empty() {
                ctx.log(&format!(
                    "{kind} prerequisites already installed: {}",
                    packages.join(" ")
                ));
                continue;
            }
            let res = ctx
                .run_cmd(tool.update_command())
                .and_then(|()| ctx.run_cmd(tool.install_command(&missing)));
            if let Err(e) = res {
                ctx.warn(&format!(
                    "could not install {kind} prerequisites ({e}); requisite packages might be missing"
                ));
            }
        }
        Ok(())
    }
}

#[Module(id = "recipe", tasks = [RequirementsTask, PrerequisitesTask])]
pub struct RecipeModule;

//! Native autotools build of the extracted source tree.

pub mod env;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf, Prefix};
use std::process::Command;

use serde::Deserialize;

use crate::error::Result;
use crate::recipe::Recipe;
use crate::settings::Os;

pub use env::BuildEnv;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel make jobs; 0 uses the CPU count.
    pub jobs: usize,
    /// Extra variables for build commands.
    pub env: BTreeMap<String, String>,
    /// Entries put in front of the inherited `PKG_CONFIG_PATH`. Accepts `@alias` paths.
    pub pkg_config_path: Vec<String>,
    /// Appended after the version's own configure flags.
    pub configure_args: Vec<String>,
}

impl BuildConfig {
    pub fn make_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }
}

/// One command of the build, run inside the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildStep {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// `./script` programs are resolved against `dir`.
    pub fn command(&self, dir: &Path, env: &BuildEnv) -> Command {
        let mut cmd = match self.program.strip_prefix("./") {
            Some(local) => Command::new(dir.join(local)),
            None => Command::new(&self.program),
        };
        cmd.args(&self.args).current_dir(dir);
        env.apply(&mut cmd);
        cmd
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// MSYS style path: `C:\pkg\vlc` becomes `/c/pkg/vlc`.
pub fn unix_path(path: &Path) -> String {
    let mut out = String::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => match p.kind() {
                Prefix::Disk(d) | Prefix::VerbatimDisk(d) => {
                    out.push('/');
                    out.push((d as char).to_ascii_lowercase());
                }
                _ => out.push_str(&p.as_os_str().to_string_lossy().replace('\\', "/")),
            },
            Component::RootDir => {}
            Component::CurDir => out.push_str("/."),
            Component::ParentDir => out.push_str("/.."),
            Component::Normal(s) => {
                out.push('/');
                out.push_str(&s.to_string_lossy());
            }
        }
    }
    if out.is_empty() { "/".into() } else { out }
}

pub fn prefix_arg(recipe: &Recipe, package_dir: &Path) -> String {
    if recipe.settings.compiler.is_gcc() && recipe.settings.os == Os::Windows {
        format!("--prefix={}", unix_path(package_dir))
    } else {
        format!("--prefix={}", package_dir.display())
    }
}

pub fn configure_args(recipe: &Recipe, cfg: &BuildConfig, package_dir: &Path) -> Vec<String> {
    let mut args = vec![prefix_arg(recipe, package_dir)];
    if recipe.settings.os == Os::Linux {
        args.push("--with-pic".into());
    }
    match recipe.options.shared {
        Some(true) => args.extend(["--enable-shared".into(), "--disable-static".into()]),
        Some(false) => args.extend(["--disable-shared".into(), "--enable-static".into()]),
        None => {}
    }
    args.extend(recipe.profile.configure_args.iter().cloned());
    args.extend(cfg.configure_args.iter().cloned());
    args
}

/// Environment for the build commands. `pkg_config_path` holds the resolved
/// `[build].pkg_config_path` entries.
pub fn build_env(
    recipe: &Recipe,
    cfg: &BuildConfig,
    mut env: BuildEnv,
    pkg_config_path: &[PathBuf],
) -> Result<BuildEnv> {
    for (k, v) in &cfg.env {
        env.set(k.clone(), v.clone());
    }
    if recipe.settings.os == Os::Linux {
        env.append_flag("CFLAGS", "-fPIC");
        env.append_flag("CXXFLAGS", "-fPIC");
    }
    if !pkg_config_path.is_empty() {
        env.prepend_paths("PKG_CONFIG_PATH", pkg_config_path)?;
    }
    Ok(env)
}

/// `./bootstrap`, `./configure`, `make`, `make install`.
pub fn autotools_steps(configure: Vec<String>, jobs: usize) -> Vec<BuildStep> {
    vec![
        BuildStep::new("./bootstrap", Vec::new()),
        BuildStep::new("./configure", configure),
        BuildStep::new("make", vec![format!("-j{jobs}")]),
        install_step(),
    ]
}

pub fn install_step() -> BuildStep {
    BuildStep::new("make", vec!["install".into()])
}

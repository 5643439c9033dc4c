use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vlc_recipe::config::ConfigDoc;
use vlc_recipe::package::info;
use vlc_recipe::recipe::{Recipe, Strategy};
use vlc_recipe::workspace::{self, WorkspaceConfig};
use vlc_recipe::{Error, Result};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Settings and option overrides shared by every command.
#[derive(Debug, clap::Args)]
struct Overrides {
    /// Override a setting, e.g. `-s os=Windows` or `-s compiler.version=6.3`
    #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
    settings: Vec<String>,
    /// Override an option, e.g. `-o shared=True`
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the recipe profile and print the computed task plan
    Plan {
        /// Path to a recipe profile TOML
        recipe: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
        /// Print GraphViz dot instead of a linear plan
        #[arg(long)]
        dot: bool,
    },
    /// Compute the plan and execute it task by task
    Run {
        /// Path to a recipe profile TOML
        recipe: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
        /// Print what would run without executing commands
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the fully-resolved profile TOML (after imports/extends and overrides)
    Resolve {
        /// Path to a recipe profile TOML
        recipe: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print recipe metadata, effective options, strategy and requirements
    Info {
        /// Path to a recipe profile TOML
        recipe: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
        /// Scan a package folder and print the consumer metadata instead
        #[arg(long)]
        package: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Plan {
            recipe,
            overrides,
            dot,
        } => cmd_plan(&load(&recipe, &overrides)?, dot),
        Command::Run {
            recipe,
            overrides,
            dry_run,
        } => cmd_run(&load(&recipe, &overrides)?, dry_run),
        Command::Resolve { recipe, overrides } => cmd_resolve(&load(&recipe, &overrides)?),
        Command::Info {
            recipe,
            overrides,
            package,
        } => cmd_info(&load(&recipe, &overrides)?, package.as_deref()),
    }
}

fn load(path: &Path, overrides: &Overrides) -> Result<ConfigDoc> {
    let mut doc = vlc_recipe::config::load(path)?;
    doc.apply_overrides(&overrides.settings, &overrides.options)?;
    tracing::debug!(
        settings = overrides.settings.len(),
        options = overrides.options.len(),
        "applied command-line overrides"
    );
    Ok(doc)
}

fn cmd_plan(doc: &ConfigDoc, dot: bool) -> Result<()> {
    let plan = vlc_recipe::modules::plan_recipe(doc)?;

    if dot {
        print!("{}", plan.to_dot()?);
        return Ok(());
    }

    let ordered = plan.ordered()?;
    for (i, task) in ordered.iter().enumerate() {
        println!(
            "{:>2}. {:<22}  {:<10} {:<14}  {}",
            i + 1,
            task.id,
            task.module,
            task.phase,
            task.label
        );
    }
    Ok(())
}

fn cmd_resolve(doc: &ConfigDoc) -> Result<()> {
    let s = toml::to_string_pretty(&doc.value)
        .map_err(|e| Error::msg(format!("failed to render resolved profile: {e}")))?;
    print!("{s}");
    Ok(())
}

fn cmd_run(doc: &ConfigDoc, dry_run: bool) -> Result<()> {
    let plan = vlc_recipe::modules::plan_recipe(doc)?;
    let reg = vlc_recipe::executor::builtin_registry()?;
    let ws: WorkspaceConfig = doc.deserialize_path("workspace")?.unwrap_or_default();
    let sink = match workspace::load_paths(&ws) {
        Ok(paths) => vlc_recipe::executor::StdoutSink::with_build_dir(paths.build_dir),
        Err(e) => {
            tracing::warn!("workspace paths unresolved, error logs go to ./build: {e}");
            vlc_recipe::executor::StdoutSink::default()
        }
    };
    let sink = Arc::new(sink);
    let mut ctx = vlc_recipe::executor::ExecCtx::new(dry_run, sink);
    vlc_recipe::executor::execute_plan(doc, &plan, &reg, &mut ctx)
}

fn cmd_info(doc: &ConfigDoc, package: Option<&Path>) -> Result<()> {
    let recipe = Recipe::from_doc(doc)?;

    if let Some(dir) = package {
        let meta = if dir.join(info::INFO_FILE).is_file() {
            info::read(dir)?
        } else {
            info::scan(dir, recipe.settings.os)?
        };
        let s = serde_json::to_string_pretty(&meta)?;
        println!("{s}");
        return Ok(());
    }

    println!("name:        {}", recipe.meta.name);
    println!("version:     {}", recipe.meta.version);
    println!("license:     {}", recipe.meta.license);
    println!("url:         {}", recipe.meta.url);
    println!("description: {}", recipe.meta.description);
    println!("settings:    {}", recipe.settings);
    match recipe.options.shared {
        Some(shared) => println!("options:     shared={}", if shared { "True" } else { "False" }),
        None => println!("options:     (none)"),
    }
    for opt in &recipe.dropped_options {
        println!("ignored:     {opt} (not an option of this configuration)");
    }
    let strategy = recipe.strategy();
    println!("strategy:    {strategy}");
    if let Strategy::Unsupported { .. } = strategy {
        println!("WARN: build and package steps will be skipped");
    }
    println!("requirements:");
    for r in recipe.requirements() {
        println!("  {r}");
    }
    Ok(())
}

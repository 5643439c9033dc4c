use std::path::PathBuf;

use vlc_recipe::config::ConfigDoc;
use vlc_recipe::planner::Plan;
use vlc_recipe::recipe::Recipe;

fn doc_for(raw: &str) -> ConfigDoc {
    let value: toml::Value = toml::from_str(raw).unwrap();
    ConfigDoc {
        path: PathBuf::from("<mem>"),
        value,
    }
}

fn plan_for(raw: &str) -> vlc_recipe::Result<Plan> {
    vlc_recipe::modules::plan_recipe(&doc_for(raw))
}

fn ids(plan: &Plan) -> Vec<String> {
    plan.ordered().unwrap().iter().map(|t| t.id.clone()).collect()
}

fn pos(ids: &[String], id: &str) -> usize {
    ids.iter()
        .position(|t| t == id)
        .unwrap_or_else(|| panic!("{id} missing from plan: {ids:?}"))
}

#[test]
fn linux_gcc_plans_native_build() {
    let raw = r#"
[recipe]
version = "3.0.4"

[settings]
os = "Linux"
compiler = "gcc"
compiler_version = "6.3"
"#;
    let plan = plan_for(raw).unwrap();
    assert!(plan.contains("build.autotools"));
    assert!(plan.contains("package.install"));
    assert!(!plan.contains("package.sdk"));

    let recipe = Recipe::from_doc(&doc_for(raw)).unwrap();
    let names: Vec<String> = recipe
        .requirements()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert!(names.contains(&"qt".to_string()), "{names:?}");
    assert!(names.contains(&"ffmpeg".to_string()), "{names:?}");
    assert!(!names.contains(&"7z_installer".to_string()), "{names:?}");
}

#[test]
fn lifecycle_runs_in_order() {
    let plan = plan_for("[settings]\nos = \"Linux\"\ncompiler = \"gcc\"\n").unwrap();
    let ids = ids(&plan);

    assert_eq!(ids[0], "core.init");
    let chain = [
        "recipe.requirements",
        "source.fetch",
        "source.verify",
        "source.extract",
        "source.patch",
        "core.barrier.source",
        "build.autotools",
        "package.install",
        "package.info",
    ];
    for pair in chain.windows(2) {
        assert!(
            pos(&ids, pair[0]) < pos(&ids, pair[1]),
            "{} should run before {}: {ids:?}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn windows_msvc_plans_sdk_copy_only() {
    let raw = r#"
[settings]
os = "Windows"
compiler = "Visual Studio"
arch = "x86_64"

[options]
shared = true
"#;
    let plan = plan_for(raw).unwrap();
    assert!(!plan.contains("build.autotools"));
    assert!(!plan.contains("package.install"));
    assert!(plan.contains("package.sdk"));

    let ids = ids(&plan);
    assert!(pos(&ids, "source.patch") < pos(&ids, "package.sdk"));
    assert!(pos(&ids, "package.sdk") < pos(&ids, "package.info"));

    let recipe = Recipe::from_doc(&doc_for(raw)).unwrap();
    assert_eq!(recipe.options.shared, None);
    let names: Vec<String> = recipe
        .requirements()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, vec!["helpers", "pkg-config", "7z_installer"]);
}

#[test]
fn windows_gcc_still_plans_build_tasks() {
    // They are skipped at run time rather than dropped from the plan.
    let plan = plan_for("[settings]\nos = \"Windows\"\ncompiler = \"gcc\"\n").unwrap();
    assert!(plan.contains("build.autotools"));
    assert!(plan.contains("package.install"));
    assert!(!plan.contains("package.sdk"));
}

#[test]
fn prerequisites_can_be_disabled() {
    let plan = plan_for(
        r#"
[settings]
os = "Linux"

[prerequisites]
enabled = false
"#,
    )
    .unwrap();
    assert!(!plan.contains("recipe.prerequisites"));
    plan.ordered().unwrap();
}

#[test]
fn core_steps_cannot_be_disabled() {
    let err = plan_for(
        r#"
[settings]
os = "Linux"

[source.steps.verify]
enabled = false
"#,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("source.steps.verify"), "unexpected err: {err}");
}

#[test]
fn rejects_unknown_tables() {
    let err = plan_for("[buildroot]\nenabled = true\n").unwrap_err().to_string();
    assert!(err.contains("buildroot"), "unexpected err: {err}");
}

#[test]
fn unsupported_version_is_an_error() {
    let err = plan_for("[recipe]\nversion = \"1.0.0\"\n[settings]\nos = \"Linux\"\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("1.0.0"), "unexpected err: {err}");
}

#[test]
fn custom_labels_show_in_plan() {
    let plan = plan_for(
        r#"
[settings]
os = "Linux"

[build.steps.autotools]
label = "Compile libvlc"
"#,
    )
    .unwrap();
    assert_eq!(plan.get("build.autotools").unwrap().label, "Compile libvlc");
}

#[test]
fn shipped_profiles_plan_cleanly() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("profiles");

    let linux = vlc_recipe::config::load(&dir.join("linux-gcc.toml")).unwrap();
    let recipe = Recipe::from_doc(&linux).unwrap();
    assert_eq!(recipe.meta.version, "3.0.4");
    assert_eq!(recipe.options.shared, Some(true));
    assert!(vlc_recipe::modules::plan_recipe(&linux).unwrap().contains("build.autotools"));

    let mut windows = vlc_recipe::config::load(&dir.join("windows-msvc.toml")).unwrap();
    windows
        .apply_overrides(&["compiler=gcc".into()], &["shared=True".into()])
        .unwrap();
    let recipe = Recipe::from_doc(&windows).unwrap();
    assert!(!recipe.just_downloading());
    assert_eq!(recipe.options.shared, Some(true));
}

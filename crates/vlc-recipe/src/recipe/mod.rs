//! The recipe itself: metadata, options, and the decisions that depend on settings.

pub mod versions;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::settings::{Os, Settings};

pub use versions::{PatchSet, VersionProfile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeMeta {
    pub name: String,
    pub version: String,
    pub license: String,
    pub url: String,
    pub description: String,
}

impl Default for RecipeMeta {
    fn default() -> Self {
        Self {
            name: "vlc".into(),
            version: "3.0.4".into(),
            license: "MIT".into(),
            url: "https://github.com/kheaactua/conan-vlc".into(),
            description: "VLC Video player".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawOptions {
    shared: Option<bool>,
}

/// Effective options. `shared` is `None` when the option does not exist for this
/// configuration (download-only targets, or versions without it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Options {
    pub shared: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Build from source with the upstream autotools build system.
    Autotools,
    /// Package the prebuilt SDK shipped in the Windows archive.
    SdkCopy,
    /// No build path exists; build and package steps are skipped.
    Unsupported { reason: String },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Autotools => write!(f, "autotools"),
            Strategy::SdkCopy => write!(f, "sdk-copy"),
            Strategy::Unsupported { reason } => write!(f, "unsupported ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementScope {
    Runtime,
    Build,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub reference: String,
    pub scope: RequirementScope,
}

impl Requirement {
    /// Package name of a `name/version@user/channel` reference.
    pub fn name(&self) -> &str {
        self.reference
            .split('/')
            .next()
            .unwrap_or(self.reference.as_str())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            RequirementScope::Runtime => "requires",
            RequirementScope::Build => "build_requires",
        };
        write!(f, "{scope} {}", self.reference)
    }
}

#[derive(Debug, Clone)]
pub struct Recipe {
    pub meta: RecipeMeta,
    pub settings: Settings,
    pub options: Options,
    pub profile: VersionProfile,
    /// Options given in the profile that do not apply to this configuration.
    pub dropped_options: Vec<String>,
}

impl Recipe {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let meta: RecipeMeta = doc.deserialize_path("recipe")?.unwrap_or_default();
        if meta.name.trim().is_empty() || meta.version.trim().is_empty() {
            return Err(Error::msg("recipe.name and recipe.version must not be empty"));
        }
        let settings = Settings::from_doc(doc)?;
        let profile = versions::resolve(doc, &meta.version)?;
        let raw: RawOptions = doc.deserialize_path("options")?.unwrap_or_default();

        let mut recipe = Recipe {
            meta,
            settings,
            options: Options { shared: None },
            profile,
            dropped_options: Vec::new(),
        };
        if recipe.has_shared_option() {
            recipe.options.shared = Some(raw.shared.unwrap_or(false));
        } else if raw.shared.is_some() {
            recipe.dropped_options.push("shared".into());
        }
        Ok(recipe)
    }

    /// True when the compiler is not gcc and the target is Windows: nothing is compiled,
    /// the prebuilt SDK from the archive is packaged instead.
    pub fn just_downloading(&self) -> bool {
        !self.settings.compiler.is_gcc() && self.settings.os == Os::Windows
    }

    pub fn builds_from_source(&self) -> bool {
        !self.just_downloading()
    }

    fn has_shared_option(&self) -> bool {
        self.profile.shared_option && !self.just_downloading()
    }

    pub fn strategy(&self) -> Strategy {
        if self.just_downloading() {
            return Strategy::SdkCopy;
        }
        match self.settings.os {
            Os::Linux if self.settings.compiler.is_gcc() => Strategy::Autotools,
            _ => Strategy::Unsupported {
                reason: format!("no native build path for {}", self.settings),
            },
        }
    }

    /// Declared requirements, in declaration order. Runtime media/UI libraries are only
    /// required when the source is built.
    pub fn requirements(&self) -> Vec<Requirement> {
        let runtime = |r: &str| Requirement {
            reference: r.to_string(),
            scope: RequirementScope::Runtime,
        };
        let build = |r: &str| Requirement {
            reference: r.to_string(),
            scope: RequirementScope::Build,
        };

        let mut out = vec![runtime("helpers/[>=0.3]@ntc/stable")];
        if self.builds_from_source() {
            out.extend(self.profile.requires.iter().map(|r| runtime(r)));
        }
        out.push(build("pkg-config/0.29.2@ntc/stable"));
        if self.settings.os == Os::Windows {
            out.push(build("7z_installer/1.0@conan/stable"));
        }
        out.extend(self.profile.build_requires.iter().map(|r| build(r)));
        out
    }

    /// Directory name of the unpacked archive, before renaming.
    pub fn upstream_dir_name(&self) -> String {
        format!("{}-{}", self.meta.name, self.meta.version)
    }

    /// Version-independent directory name the source tree is renamed to.
    pub fn canonical_dir_name(&self) -> &str {
        &self.meta.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(raw: &str) -> Recipe {
        Recipe::from_doc(&ConfigDoc::parse("<mem>", raw).unwrap()).unwrap()
    }

    #[test]
    fn linux_gcc_builds_with_autotools() {
        let r = recipe(
            r#"
[recipe]
version = "3.0.4"
[settings]
os = "Linux"
compiler = "gcc"
compiler_version = "6.3"
"#,
        );
        assert!(!r.just_downloading());
        assert_eq!(r.strategy(), Strategy::Autotools);
        assert_eq!(r.options.shared, Some(false));

        let reqs = r.requirements();
        let names: Vec<&str> = reqs.iter().map(Requirement::name).collect();
        assert_eq!(names, vec!["helpers", "qt", "ffmpeg", "pkg-config"]);
    }

    #[test]
    fn windows_msvc_is_download_only() {
        let r = recipe(
            r#"
[settings]
os = "Windows"
compiler = "Visual Studio"
[options]
shared = true
"#,
        );
        assert!(r.just_downloading());
        assert_eq!(r.strategy(), Strategy::SdkCopy);
        assert_eq!(r.options.shared, None);
        assert_eq!(r.dropped_options, vec!["shared".to_string()]);

        let reqs = r.requirements();
        let names: Vec<&str> = reqs.iter().map(Requirement::name).collect();
        assert_eq!(names, vec!["helpers", "pkg-config", "7z_installer"]);
    }

    #[test]
    fn windows_gcc_is_unsupported_but_not_an_error() {
        let r = recipe("[settings]\nos = \"Windows\"\ncompiler = \"gcc\"\n");
        assert!(!r.just_downloading());
        assert!(matches!(r.strategy(), Strategy::Unsupported { .. }));
        assert_eq!(r.options.shared, Some(false));
    }

    #[test]
    fn shared_option_follows_version_profile() {
        let r = recipe(
            "[recipe]\nversion = \"2.2.8\"\n[settings]\nos = \"Linux\"\n[options]\nshared = true\n",
        );
        assert_eq!(r.options.shared, None);
        assert_eq!(r.upstream_dir_name(), "vlc-2.2.8");
        assert_eq!(r.canonical_dir_name(), "vlc");
    }

    #[test]
    fn unknown_options_are_rejected() {
        let doc = ConfigDoc::parse("<mem>", "[options]\nfPIC = true\n").unwrap();
        assert!(Recipe::from_doc(&doc).is_err());
    }
}

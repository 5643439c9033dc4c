use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDoc;
use crate::error::{Error, Result};

/// Which source patches apply to a version (Windows targets only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSet {
    /// `poll` redefinition in `vlc_threads.h`.
    pub poll: bool,
    /// `ssize_t` return type of `libvlc_media_read_cb` in `libvlc_media.h`.
    pub read_cb_typedef: bool,
}

impl Default for PatchSet {
    fn default() -> Self {
        Self {
            poll: true,
            read_cb_typedef: true,
        }
    }
}

/// Everything that differs between upstream versions, as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionProfile {
    pub version: String,
    /// Runtime requirements, declared only when the source is actually built.
    pub requires: Vec<String>,
    /// Extra build requirements on top of the always-present ones.
    pub build_requires: Vec<String>,
    pub configure_args: Vec<String>,
    pub patches: PatchSet,
    /// Whether the `shared` option exists at all for this version.
    pub shared_option: bool,
}

impl VersionProfile {
    fn blank(version: &str) -> Self {
        Self {
            version: version.to_string(),
            requires: Vec::new(),
            build_requires: Vec::new(),
            configure_args: Vec::new(),
            patches: PatchSet::default(),
            shared_option: true,
        }
    }
}

const QT: &str = "qt/[>=5.9.0]@ntc/stable";
const FFMPEG: &str = "ffmpeg/3.4@ntc/stable";

pub const BUILTIN_VERSIONS: &[&str] = &["2.2.8", "3.0.3", "3.0.4"];

pub fn builtin(version: &str) -> Option<VersionProfile> {
    let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut p = VersionProfile::blank(version);
    match version {
        "2.2.8" => {
            // The 2.x SDK has no libvlc_media_read_cb.
            p.requires = strings(&[FFMPEG]);
            p.configure_args = strings(&["--disable-lua", "--disable-mad", "--disable-a52", "--disable-qt"]);
            p.patches.read_cb_typedef = false;
            p.shared_option = false;
        }
        "3.0.3" => {
            p.requires = strings(&[QT, FFMPEG]);
            p.configure_args = strings(&["--disable-lua", "--disable-a52"]);
        }
        "3.0.4" => {
            p.requires = strings(&[QT, FFMPEG]);
        }
        _ => return None,
    }
    Some(p)
}

/// `[versions."<v>"]`: partial override of a built-in profile, or a new version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct VersionOverride {
    requires: Option<Vec<String>>,
    build_requires: Option<Vec<String>>,
    configure_args: Option<Vec<String>>,
    patches: Option<PatchSet>,
    shared_option: Option<bool>,
}

/// Resolve the profile for `version`: the built-in entry (if any) with the profile's
/// `[versions."<version>"]` table applied on top.
pub fn resolve(doc: &ConfigDoc, version: &str) -> Result<VersionProfile> {
    let overrides: BTreeMap<String, VersionOverride> =
        doc.deserialize_path("versions")?.unwrap_or_default();
    let ov = overrides.get(version);

    let mut profile = match (builtin(version), ov) {
        (Some(p), _) => p,
        (None, Some(_)) => VersionProfile::blank(version),
        (None, None) => {
            return Err(Error::msg(format!(
                "unknown recipe version '{version}' (built-in: {}; add a [versions.\"{version}\"] table to define it)",
                BUILTIN_VERSIONS.join(", ")
            )));
        }
    };

    if let Some(ov) = ov {
        if let Some(v) = &ov.requires {
            profile.requires = v.clone();
        }
        if let Some(v) = &ov.build_requires {
            profile.build_requires = v.clone();
        }
        if let Some(v) = &ov.configure_args {
            profile.configure_args = v.clone();
        }
        if let Some(v) = ov.patches {
            profile.patches = v;
        }
        if let Some(v) = ov.shared_option {
            profile.shared_option = v;
        }
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_all_variants() {
        for v in BUILTIN_VERSIONS {
            assert_eq!(builtin(v).unwrap().version, *v);
        }
        assert!(builtin("1.0.0").is_none());
        assert!(!builtin("2.2.8").unwrap().patches.read_cb_typedef);
        assert_eq!(builtin("3.0.4").unwrap().requires.len(), 2);
    }

    #[test]
    fn override_replaces_only_given_fields() {
        let doc = ConfigDoc::parse(
            "<mem>",
            r#"
[versions."3.0.4"]
configure_args = ["--disable-nls"]
"#,
        )
        .unwrap();
        let p = resolve(&doc, "3.0.4").unwrap();
        assert_eq!(p.configure_args, vec!["--disable-nls".to_string()]);
        assert_eq!(p.requires, builtin("3.0.4").unwrap().requires);
    }

    #[test]
    fn new_versions_need_a_table() {
        let doc = ConfigDoc::parse("<mem>", "").unwrap();
        assert!(resolve(&doc, "3.0.8").is_err());

        let doc = ConfigDoc::parse(
            "<mem>",
            "[versions.\"3.0.8\"]\nrequires = [\"ffmpeg/4.0@ntc/stable\"]\n",
        )
        .unwrap();
        let p = resolve(&doc, "3.0.8").unwrap();
        assert_eq!(p.requires, vec!["ffmpeg/4.0@ntc/stable".to_string()]);
        assert!(p.shared_option);
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        let doc = ConfigDoc::parse("<mem>", "[versions.\"3.0.4\"]\nflags = []\n").unwrap();
        assert!(resolve(&doc, "3.0.4").is_err());
    }
}

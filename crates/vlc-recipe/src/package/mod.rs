//! Assembling the package folder (`bin/`, `lib/`, `include/`).

pub mod info;

use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub use info::PackageInfo;

/// Copy every file under `from` whose relative path matches `pattern` into `to`,
/// keeping the relative layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRule {
    pub pattern: &'static str,
    /// Relative to the source tree root; empty means the root itself.
    pub from: &'static str,
    /// Relative to the package folder.
    pub to: &'static str,
}

/// Layout of the prebuilt Windows SDK inside the extracted archive.
pub const SDK_COPY_RULES: &[CopyRule] = &[
    CopyRule {
        pattern: "*.dll",
        from: "",
        to: "bin",
    },
    CopyRule {
        pattern: "*.lib",
        from: "sdk/lib",
        to: "lib",
    },
    CopyRule {
        pattern: "*.pc",
        from: "sdk/lib/pkgconfig",
        to: "lib/pkgconfig",
    },
    CopyRule {
        pattern: "*",
        from: "sdk/include",
        to: "include",
    },
];

fn join_rel(base: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |p, seg| p.join(seg))
}

/// Apply one rule, returning the copied destination files. A missing `from`
/// directory copies nothing.
pub fn copy_matching(source_root: &Path, rule: &CopyRule, package_dir: &Path) -> Result<Vec<PathBuf>> {
    let src = join_rel(source_root, rule.from);
    let dst = join_rel(package_dir, rule.to);
    if !src.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = Pattern::new(rule.pattern)
        .map_err(|e| Error::msg(format!("invalid copy pattern '{}': {e}", rule.pattern)))?;
    let opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let mut copied = Vec::new();
    for entry in WalkDir::new(&src).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&src)
            .map_err(|e| Error::msg(format!("walk outside {}: {e}", src.display())))?;
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if !pattern.matches_with(&rel_str, opts) {
            continue;
        }
        let out = dst.join(rel);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::msg(format!("failed to create dir {}: {e}", parent.display()))
            })?;
        }
        fs::copy(entry.path(), &out).map_err(|e| {
            Error::msg(format!(
                "failed to copy {} -> {}: {e}",
                entry.path().display(),
                out.display()
            ))
        })?;
        copied.push(out);
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(p: &Path) {
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, p.display().to_string()).unwrap();
    }

    #[test]
    fn sdk_rules_preserve_relative_layout() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = tmp.path().join("vlc");
        touch(&src.join("libvlc.dll"));
        touch(&src.join("plugins").join("access").join("libfile_plugin.dll"));
        touch(&src.join("sdk").join("lib").join("libvlc.lib"));
        touch(&src.join("sdk").join("lib").join("pkgconfig").join("libvlc.pc"));
        touch(&src.join("sdk").join("include").join("vlc").join("vlc.h"));
        touch(&src.join("README.txt"));

        let pkg = tmp.path().join("package");
        let mut total = 0;
        for rule in SDK_COPY_RULES {
            total += copy_matching(&src, rule, &pkg).unwrap().len();
        }
        assert_eq!(total, 5);
        assert!(pkg.join("bin").join("libvlc.dll").is_file());
        assert!(pkg.join("bin").join("plugins").join("access").join("libfile_plugin.dll").is_file());
        assert!(pkg.join("lib").join("libvlc.lib").is_file());
        assert!(pkg.join("lib").join("pkgconfig").join("libvlc.pc").is_file());
        assert!(pkg.join("include").join("vlc").join("vlc.h").is_file());
        assert!(!pkg.join("bin").join("README.txt").exists());
    }

    #[test]
    fn missing_source_dir_copies_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let out = copy_matching(tmp.path(), &SDK_COPY_RULES[1], &tmp.path().join("pkg")).unwrap();
        assert!(out.is_empty());
        assert!(!tmp.path().join("pkg").exists());
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static PKG_CONFIG_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PKG_CONFIG").expect("pkg-config pattern is valid"));

/// Environment for build subprocesses: a snapshot of the inherited environment plus
/// an overlay. Only child commands ever see the overlay.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    base: BTreeMap<String, String>,
    overlay: BTreeMap<String, String>,
}

impl BuildEnv {
    pub fn from_process() -> Self {
        Self::with_base(std::env::vars())
    }

    pub fn with_base(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            base: vars.into_iter().collect(),
            overlay: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.overlay
            .get(key)
            .or_else(|| self.base.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.overlay.insert(key.into(), value.into());
    }

    /// Append a flag to a space separated variable such as `CFLAGS`.
    pub fn append_flag(&mut self, key: &str, flag: &str) {
        let value = match self.get(key).map(str::trim).filter(|v| !v.is_empty()) {
            Some(cur) if cur.split_whitespace().any(|f| f == flag) => return,
            Some(cur) => format!("{cur} {flag}"),
            None => flag.to_string(),
        };
        self.set(key, value);
    }

    /// Put `entries` in front of the path list `key`, dropping later duplicates.
    pub fn prepend_paths(&mut self, key: &str, entries: &[PathBuf]) -> Result<()> {
        let mut list: Vec<PathBuf> = entries.to_vec();
        if let Some(cur) = self.get(key) {
            list.extend(std::env::split_paths(cur));
        }
        let mut seen = BTreeSet::new();
        list.retain(|p| !p.as_os_str().is_empty() && seen.insert(p.clone()));

        let joined: OsString = std::env::join_paths(&list)
            .map_err(|e| Error::msg(format!("invalid {key} entry: {e}")))?;
        self.set(key, joined.to_string_lossy().into_owned());
        Ok(())
    }

    pub fn overlay(&self) -> &BTreeMap<String, String> {
        &self.overlay
    }

    /// All `PKG_CONFIG*` variables children will see, sorted by name.
    pub fn pkg_config_vars(&self) -> Vec<(&str, &str)> {
        let mut merged: BTreeMap<&str, &str> = BTreeMap::new();
        for (k, v) in self.base.iter().chain(self.overlay.iter()) {
            if PKG_CONFIG_VAR.is_match(k) {
                merged.insert(k.as_str(), v.as_str());
            }
        }
        merged.into_iter().collect()
    }

    pub fn apply(&self, cmd: &mut Command) {
        cmd.envs(&self.overlay);
    }
}

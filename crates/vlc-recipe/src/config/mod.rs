use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};

/// A fully-resolved recipe profile (imports and `extends` already merged).
#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn parse(path: impl Into<PathBuf>, raw: &str) -> Result<Self> {
        let value: Value = toml::from_str(raw)?;
        Ok(Self {
            path: path.into(),
            value,
        })
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }

        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v
            .clone()
            .try_into()
            .map_err(|e| Error::msg(format!("failed to deserialize config at '{}': {e}", path)))?;
        Ok(Some(parsed))
    }

    pub fn table_path(&self, path: &str) -> Option<&toml::value::Table> {
        self.value_path(path)?.as_table()
    }

    pub fn has_table_path(&self, path: &str) -> bool {
        self.table_path(path).is_some()
    }

    /// Directory the profile was loaded from; relative recipe paths resolve here.
    pub fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Apply `-s key=value` and `-o key=value` style overrides on top of the document.
    pub fn apply_overrides(&mut self, settings: &[String], options: &[String]) -> Result<()> {
        let mut overlay = toml::value::Table::new();

        let mut settings_tbl = toml::value::Table::new();
        for raw in settings {
            let (key, value) = split_assignment(raw)?;
            let field = match key {
                "os" => "os",
                "compiler" => "compiler",
                "compiler.version" | "compiler_version" => "compiler_version",
                "arch" => "arch",
                other => {
                    return Err(Error::msg(format!(
                        "unknown setting '{other}' (known: os, compiler, compiler.version, arch)"
                    )));
                }
            };
            settings_tbl.insert(field.into(), Value::String(value.into()));
        }
        if !settings_tbl.is_empty() {
            overlay.insert("settings".into(), Value::Table(settings_tbl));
        }

        let mut options_tbl = toml::value::Table::new();
        for raw in options {
            let (key, value) = split_assignment(raw)?;
            options_tbl.insert(key.into(), parse_option_value(value));
        }
        if !options_tbl.is_empty() {
            overlay.insert("options".into(), Value::Table(options_tbl));
        }

        merge(&mut self.value, Value::Table(overlay));
        Ok(())
    }
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    let (k, v) = raw
        .split_once('=')
        .ok_or_else(|| Error::msg(format!("expected key=value, got '{raw}'")))?;
    let (k, v) = (k.trim(), v.trim());
    if k.is_empty() {
        return Err(Error::msg(format!("empty key in '{raw}'")));
    }
    Ok((k, v))
}

fn parse_option_value(raw: &str) -> Value {
    match raw {
        "True" | "true" => Value::Boolean(true),
        "False" | "false" => Value::Boolean(false),
        other => Value::String(other.to_string()),
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

pub fn merge(base: &mut Value, overlay: Value) {
    merge_values(base, overlay);
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn parse_imports(path: &Path, table: &toml::value::Table) -> Result<Vec<String>> {
    let Some(arr) = table.get("imports").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(Error::msg(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn inline_imports(file_path: &Path, value: &mut Value, stack: &mut HashSet<PathBuf>) -> Result<()> {
    let Value::Table(tbl) = value else {
        return Ok(());
    };

    let imports = parse_imports(file_path, tbl)?;
    tbl.remove("imports");
    if !imports.is_empty() {
        let mut acc = Value::Table(Default::default());
        for imp in imports {
            let loaded = load_value_inner(&resolve_ref_path(file_path, &imp), stack)?;
            merge_values(&mut acc, loaded);
        }
        merge_values(&mut acc, Value::Table(std::mem::take(tbl)));
        if let Value::Table(merged) = acc {
            *tbl = merged;
        }
    }

    for (_, v) in tbl.iter_mut() {
        inline_imports(file_path, v, stack)?;
    }
    Ok(())
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "recipe profile import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read recipe profile {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    // A profile may extend exactly one parent; the child wins on conflicts.
    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, ext), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }

    inline_imports(path, &mut value, stack)?;
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    tracing::debug!(path = %path.display(), "loaded recipe profile");
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

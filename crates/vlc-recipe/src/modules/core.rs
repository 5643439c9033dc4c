use crate::config::ConfigDoc;
use crate::error::Result;
use crate::modules::Module;
use crate::planner::{Plan, Task};

pub struct CoreModule;

/// Top-level tables a recipe profile may contain.
pub const KNOWN_TABLES: &[&str] = &[
    "recipe",
    "settings",
    "options",
    "workspace",
    "prerequisites",
    "source",
    "build",
    "package",
    "versions",
];

impl Module for CoreModule {
    fn id(&self) -> &'static str {
        "core"
    }

    fn plan(&self, doc: &ConfigDoc, plan: &mut Plan) -> Result<()> {
        if let Some(root) = doc.value.as_table() {
            for (key, value) in root {
                if value.is_table() && !KNOWN_TABLES.contains(&key.as_str()) {
                    return Err(crate::Error::msg(format!(
                        "config table '{}' is not supported in a recipe profile; use {}",
                        key,
                        KNOWN_TABLES.join(", ")
                    )));
                }
            }
        }

        plan.add(Task {
            id: "core.init".into(),
            label: "Init".into(),
            module: self.id().into(),
            phase: "init".into(),
            after: vec![],
            provides: vec!["core:initialized".into()],
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tables_are_rejected() {
        let doc = ConfigDoc::parse("<mem>", "[buildroot]\nversion = \"1\"\n").unwrap();
        let err = CoreModule.plan(&doc, &mut Plan::default()).unwrap_err().to_string();
        assert!(err.contains("'buildroot'"), "unexpected err: {err}");

        let doc = ConfigDoc::parse("<mem>", "[recipe]\nversion = \"3.0.4\"\n").unwrap();
        let mut plan = Plan::default();
        CoreModule.plan(&doc, &mut plan).unwrap();
        assert!(plan.contains("core.init"));
    }
}

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{Error, Result};

pub type TaskId = String;

pub const SOURCE_BARRIER_ID: &str = "core.barrier.source";
pub const SOURCE_READY_TOKEN: &str = "source:ready";

/// One lifecycle step. `after` entries name task ids or provide tokens; a trailing `?`
/// makes the dependency optional (ignored when nothing satisfies it).
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub label: String,
    pub module: String,
    pub phase: String,
    pub after: Vec<TaskId>,
    pub provides: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Plan {
    tasks: BTreeMap<TaskId, Task>,
}

impl Plan {
    pub fn add(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(Error::msg(format!("duplicate task id '{}'", task.id)));
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    fn provides_index(&self) -> Result<BTreeMap<&str, &str>> {
        let mut out: BTreeMap<&str, &str> = BTreeMap::new();
        for (id, task) in &self.tasks {
            for p in &task.provides {
                if let Some(existing) = out.insert(p.as_str(), id.as_str()) {
                    return Err(Error::msg(format!(
                        "provide token '{}' is produced by both '{}' and '{}'",
                        p, existing, id
                    )));
                }
            }
        }
        Ok(out)
    }

    fn resolve_dep<'a>(
        &'a self,
        provides: &BTreeMap<&'a str, &'a str>,
        task_id: &str,
        dep: &'a str,
    ) -> Result<Option<&'a str>> {
        let (dep, optional) = dep
            .strip_suffix('?')
            .map(|d| (d, true))
            .unwrap_or((dep, false));
        if let Some((id, _)) = self.tasks.get_key_value(dep) {
            return Ok(Some(id.as_str()));
        }
        if let Some(&provider) = provides.get(dep) {
            return Ok(Some(provider));
        }
        if optional {
            return Ok(None);
        }
        Err(Error::msg(format!(
            "task '{}' has invalid dependency '{}': unknown dependency",
            task_id, dep
        )))
    }

    fn edges(&self) -> Result<Vec<(&str, &str)>> {
        let provides = self.provides_index()?;
        let mut out = Vec::new();
        for task in self.tasks.values() {
            for dep in &task.after {
                if let Some(dep_id) = self.resolve_dep(&provides, &task.id, dep)? {
                    out.push((dep_id, task.id.as_str()));
                }
            }
        }
        Ok(out)
    }

    /// Topological order; ties are broken by task id so the result is stable.
    pub fn ordered(&self) -> Result<Vec<&Task>> {
        let mut incoming: BTreeMap<&str, usize> = BTreeMap::new();
        let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for id in self.tasks.keys() {
            incoming.insert(id.as_str(), 0);
            outgoing.entry(id.as_str()).or_default();
        }
        for (from, to) in self.edges()? {
            if outgoing.entry(from).or_default().insert(to) {
                *incoming.entry(to).or_default() += 1;
            }
        }

        let mut q: VecDeque<&str> = incoming
            .iter()
            .filter_map(|(k, v)| (*v == 0).then_some(*k))
            .collect();
        let mut out: Vec<&Task> = Vec::with_capacity(self.tasks.len());

        while let Some(n) = q.pop_front() {
            if let Some(task) = self.tasks.get(n) {
                out.push(task);
            }
            let Some(children) = outgoing.get(n) else {
                continue;
            };
            for &m in children {
                if let Some(slot) = incoming.get_mut(m) {
                    *slot -= 1;
                    if *slot == 0 {
                        q.push_back(m);
                    }
                }
            }
        }

        if out.len() != self.tasks.len() {
            let remaining: Vec<&str> = incoming
                .iter()
                .filter_map(|(k, v)| (*v > 0).then_some(*k))
                .collect();
            return Err(Error::msg(format!(
                "task graph contains a cycle; remaining nodes: {}",
                remaining.join(", ")
            )));
        }
        Ok(out)
    }

    pub fn finalize_default(&mut self) -> Result<()> {
        self.add_source_barrier()
    }

    // Every task providing a `source:*` token feeds one barrier that provides
    // `source:ready`; build and package steps depend on the barrier only.
    fn add_source_barrier(&mut self) -> Result<()> {
        if self.tasks.contains_key(SOURCE_BARRIER_ID) {
            return Ok(());
        }

        let deps: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.provides.iter().any(|p| p.starts_with("source:")))
            .map(|t| t.id.clone())
            .collect();

        self.add(Task {
            id: SOURCE_BARRIER_ID.into(),
            label: "Source ready".into(),
            module: "core".into(),
            phase: "barrier".into(),
            after: deps,
            provides: vec![SOURCE_READY_TOKEN.into()],
        })
    }

    pub fn to_dot(&self) -> Result<String> {
        let mut out = String::from("digraph recipe {\n  rankdir=LR;\n");
        for task in self.tasks.values() {
            out.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}:{}\"];\n",
                task.id, task.label, task.module, task.phase
            ));
        }
        for (from, to) in self.edges()? {
            out.push_str(&format!("  \"{}\" -> \"{}\";\n", from, to));
        }
        out.push_str("}\n");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, after: &[&str], provides: &[&str]) -> Task {
        Task {
            id: id.into(),
            label: id.into(),
            module: "test".into(),
            phase: "test".into(),
            after: after.iter().map(|s| s.to_string()).collect(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn orders_by_tokens_and_skips_missing_optional_deps() {
        let mut plan = Plan::default();
        plan.add(task("b", &["tok:a", "missing?"], &[])).unwrap();
        plan.add(task("a", &[], &["tok:a"])).unwrap();
        let ids: Vec<&str> = plan
            .ordered()
            .unwrap()
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_required_dep_is_an_error() {
        let mut plan = Plan::default();
        plan.add(task("b", &["nope"], &[])).unwrap();
        let err = plan.ordered().unwrap_err().to_string();
        assert!(err.contains("'nope'"), "unexpected err: {err}");
    }

    #[test]
    fn detects_cycles() {
        let mut plan = Plan::default();
        plan.add(task("a", &["b"], &[])).unwrap();
        plan.add(task("b", &["a"], &[])).unwrap();
        assert!(plan.ordered().is_err());
    }

    #[test]
    fn source_barrier_waits_for_all_source_producers() {
        let mut plan = Plan::default();
        plan.add(task("fetch", &[], &["source:archive"])).unwrap();
        plan.add(task("patch", &["fetch"], &["source:patched"])).unwrap();
        plan.add(task("build", &[SOURCE_READY_TOKEN], &[])).unwrap();
        plan.finalize_default().unwrap();

        let barrier = plan.get(SOURCE_BARRIER_ID).unwrap();
        assert_eq!(barrier.after, vec!["fetch".to_string(), "patch".to_string()]);
        let ids: Vec<&str> = plan
            .ordered()
            .unwrap()
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids.last(), Some(&"build"));
    }
}

//! Immutable task graph with deterministic ordering and hashing.
//!
//! A [`TaskGraph`] is built once from a plan namespace and a list of tasks.
//! Ids are resolved at construction time; the graph exposes no mutators, so
//! executors can read it concurrently without coordination.
//!
//! Ordering uses Kahn's algorithm with a ready set that always yields the
//! smallest id first, so equivalent graphs built from differently ordered
//! task lists produce identical orders and identical structural hashes.

use std::collections::{BTreeSet, HashMap};

use serde_json::json;

use crate::domain::digest::{compute_digest, sort_keys};
use crate::domain::error::{GraphError, GraphResult};
use crate::domain::task::Task;
use crate::parallel::DagItem;

/// Directed acyclic graph of tasks within one plan namespace.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    plan_id: String,
    tasks: Vec<Task>,
    /// Resolved ids, parallel to `tasks`.
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    /// Resolve ids and check references, without checking for cycles.
    ///
    /// Rejects duplicate ids and dependencies on ids outside the graph. Call
    /// [`TaskGraph::validate_acyclic`] (or use [`TaskGraph::build`]) before
    /// scheduling anything from the result.
    pub fn new(plan_id: impl Into<String>, tasks: Vec<Task>) -> GraphResult<Self> {
        let plan_id = plan_id.into();
        let mut ids = Vec::with_capacity(tasks.len());
        let mut index = HashMap::with_capacity(tasks.len());

        for (i, task) in tasks.iter().enumerate() {
            let id = task.compute_id(&plan_id)?;
            if index.insert(id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask { id });
            }
            ids.push(id);
        }

        for (task, id) in tasks.iter().zip(&ids) {
            if let Some(missing) = task.dependencies().iter().find(|d| !index.contains_key(*d)) {
                return Err(GraphError::UnknownDependency {
                    task_id: id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        Ok(Self {
            plan_id,
            tasks,
            ids,
            index,
        })
    }

    /// Construct and validate a graph. Fails with [`GraphError::Cycle`]
    /// before anything can be scheduled from it.
    pub fn build(plan_id: impl Into<String>, tasks: Vec<Task>) -> GraphResult<Self> {
        let graph = Self::new(plan_id, tasks)?;
        graph.validate_acyclic()?;
        Ok(graph)
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Resolved ids in construction order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate `(id, task)` pairs in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Task)> {
        self.ids.iter().map(String::as_str).zip(self.tasks.iter())
    }

    /// Kahn's algorithm; the ready set pops the smallest id at every step.
    fn kahn(&self) -> GraphResult<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(self.len());
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::with_capacity(self.len());

        for (id, task) in self.iter() {
            in_degree.insert(id, task.dependencies().len());
            for dep in task.dependencies() {
                dependents.entry(dep.as_str()).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < self.len() {
            return Err(GraphError::Cycle {
                unresolved: self.len() - order.len(),
                total: self.len(),
            });
        }
        Ok(order)
    }

    /// Fail with [`GraphError::Cycle`] if any dependency cycle exists.
    pub fn validate_acyclic(&self) -> GraphResult<()> {
        self.kahn().map(|_| ())
    }

    /// Task ids with every dependency before its dependents; ties broken by
    /// ascending id.
    pub fn topological_order(&self) -> GraphResult<Vec<String>> {
        self.kahn()
    }

    fn canonical_tasks(&self) -> GraphResult<Vec<serde_json::Value>> {
        let mut entries: Vec<(&str, &str, &Task)> = self
            .iter()
            .map(|(id, task)| (id, task.name.as_str(), task))
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries
            .into_iter()
            .map(|(_, _, task)| task.canonical(&self.plan_id))
            .collect()
    }

    /// SHA-256 over `{plan_id, tasks}` with tasks sorted by `(id, name)`.
    ///
    /// Independent of the order tasks were supplied in.
    pub fn stable_hash(&self) -> GraphResult<String> {
        compute_digest(&json!({
            "plan_id": self.plan_id,
            "tasks": self.canonical_tasks()?,
        }))
    }

    /// Pretty, key-sorted JSON snapshot of the graph.
    pub fn to_json(&self) -> GraphResult<String> {
        let snapshot = json!({
            "plan_id": self.plan_id,
            "tasks": self.canonical_tasks()?,
        });
        Ok(serde_json::to_string_pretty(&sort_keys(&snapshot))?)
    }

    /// Mermaid flowchart: one node per task, one edge per dependency.
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["graph TD".to_string()];
        for (id, task) in self.iter() {
            lines.push(format!("  {id}[{}]", task.name.replace('"', "'")));
        }
        for (id, task) in self.iter() {
            for dep in task.dependencies() {
                lines.push(format!("  {dep} --> {id}"));
            }
        }
        lines.join("\n")
    }

    /// Items for [`crate::parallel::ParallelExecutor::execute_dag`], named by task id.
    pub fn to_dag_items(&self) -> Vec<DagItem<Task>> {
        self.iter()
            .map(|(id, task)| DagItem::new(id, task.dependencies().to_vec(), task.clone()))
            .collect()
    }

    /// Ids of tasks that directly depend on `id`, ascending.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .iter()
            .filter(|(_, task)| task.dependencies().iter().any(|d| d == id))
            .map(|(tid, _)| tid)
            .collect();
        out.sort_unstable();
        out
    }

    /// Ids of tasks without dependencies, ascending.
    pub fn roots(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .iter()
            .filter(|(_, task)| task.dependencies().is_empty())
            .map(|(id, _)| id)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn edge_count(&self) -> usize {
        self.tasks.iter().map(|t| t.dependencies().len()).sum()
    }
}

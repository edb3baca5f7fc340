//! Tasks and their content-addressed identity.
//!
//! A task's id is derived from everything that defines it: the plan
//! namespace, name, type, params, inputs, outputs and the *sorted* set of
//! dependency ids. Two processes given the same task therefore agree on its
//! id, and reordering `depends_on` never changes it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::domain::digest::short_digest;
use crate::domain::error::GraphResult;

/// Kind of pipeline work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GenerateCode,
    Assemble,
    Validate,
    Test,
    Package,
    Deploy,
    Custom,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::GenerateCode => "generate_code",
            TaskType::Assemble => "assemble",
            TaskType::Validate => "validate",
            TaskType::Test => "test",
            TaskType::Package => "package",
            TaskType::Deploy => "deploy",
            TaskType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Input,
    Output,
}

/// Declared input or output of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub kind: ArtifactKind,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

impl ArtifactDescriptor {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ArtifactKind::Input,
            uri: None,
            media_type: None,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ArtifactKind::Output,
            uri: None,
            media_type: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// A unit of work with explicit dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub inputs: Vec<ArtifactDescriptor>,
    #[serde(default)]
    pub outputs: Vec<ArtifactDescriptor>,
    /// Dependency ids, de-duplicated, first-occurrence order kept for display.
    #[serde(default, deserialize_with = "dedup_ids")]
    depends_on: Vec<String>,
    /// Explicit id override; bypasses content addressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn dedup_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for id in raw {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    Ok(out)
}

impl Task {
    pub fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            name: name.into(),
            task_type,
            params: serde_json::Map::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            id: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_input(mut self, input: ArtifactDescriptor) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: ArtifactDescriptor) -> Self {
        self.outputs.push(output);
        self
    }

    /// Add a dependency. Adding an id that is already present is a no-op.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.add_dependency(id);
        self
    }

    pub fn add_dependency(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Dependencies in the order they were first added.
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    fn sorted_dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self.depends_on.iter().map(String::as_str).collect();
        deps.sort_unstable();
        deps
    }

    fn identity_payload(&self, namespace: &str) -> serde_json::Value {
        json!({
            "namespace": namespace,
            "name": self.name,
            "type": self.task_type,
            "params": self.params,
            "inputs": self.inputs,
            "outputs": self.outputs,
            "depends_on": self.sorted_dependencies(),
        })
    }

    /// Content-addressed id within `namespace`, or the explicit id if set.
    ///
    /// Pure: repeated calls on an unmodified task return the same value.
    pub fn compute_id(&self, namespace: &str) -> GraphResult<String> {
        match &self.id {
            Some(id) => Ok(id.clone()),
            None => short_digest(&self.identity_payload(namespace)),
        }
    }

    /// Canonical map of the task including its resolved id.
    pub fn canonical(&self, namespace: &str) -> GraphResult<serde_json::Value> {
        let id = self.compute_id(namespace)?;
        let mut payload = self.identity_payload(namespace);
        if let serde_json::Value::Object(map) = &mut payload {
            map.remove("namespace");
            map.insert("id".to_string(), serde_json::Value::String(id));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Task {
        Task::new("compile", TaskType::Assemble)
            .with_param("target", json!("x86_64"))
            .with_input(ArtifactDescriptor::input("src").with_uri("file:///src"))
            .with_output(ArtifactDescriptor::output("bin").with_media_type("application/octet-stream"))
    }

    #[test]
    fn compute_id_is_sixteen_hex_chars() {
        let id = build().compute_id("plan").unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn compute_id_is_idempotent() {
        let task = build();
        assert_eq!(task.compute_id("plan").unwrap(), task.compute_id("plan").unwrap());
    }

    #[test]
    fn dependency_order_does_not_affect_id() {
        let a = build().depends_on("aaa").depends_on("bbb");
        let b = build().depends_on("bbb").depends_on("aaa");
        assert_eq!(a.compute_id("plan").unwrap(), b.compute_id("plan").unwrap());
        // Display order is preserved.
        assert_eq!(a.dependencies(), ["aaa", "bbb"]);
        assert_eq!(b.dependencies(), ["bbb", "aaa"]);
    }

    #[test]
    fn duplicate_dependencies_are_removed() {
        let task = build().depends_on("x").depends_on("y").depends_on("x");
        assert_eq!(task.dependencies(), ["x", "y"]);
        assert_eq!(
            task.compute_id("plan").unwrap(),
            build().depends_on("y").depends_on("x").compute_id("plan").unwrap()
        );
    }

    #[test]
    fn every_field_contributes_to_id() {
        let base = build().compute_id("plan").unwrap();
        let variants = [
            build().compute_id("other-plan").unwrap(),
            {
                let mut t = build();
                t.name = "link".into();
                t.compute_id("plan").unwrap()
            },
            {
                let mut t = build();
                t.task_type = TaskType::Custom;
                t.compute_id("plan").unwrap()
            },
            build().with_param("opt", json!(3)).compute_id("plan").unwrap(),
            build().with_input(ArtifactDescriptor::input("cfg")).compute_id("plan").unwrap(),
            build().with_output(ArtifactDescriptor::output("log")).compute_id("plan").unwrap(),
            build().depends_on("dep").compute_id("plan").unwrap(),
        ];
        for variant in variants {
            assert_ne!(variant, base);
        }
    }

    #[test]
    fn explicit_id_wins() {
        let task = build().with_id("fixed");
        assert_eq!(task.compute_id("plan").unwrap(), "fixed");
    }

    #[test]
    fn canonical_includes_id_and_sorted_dependencies() {
        let task = build().depends_on("zz").depends_on("aa");
        let canonical = task.canonical("plan").unwrap();
        assert_eq!(canonical["id"], json!(task.compute_id("plan").unwrap()));
        assert_eq!(canonical["depends_on"], json!(["aa", "zz"]));
        assert_eq!(canonical["type"], json!("assemble"));
        assert!(canonical.get("namespace").is_none());
    }

    #[test]
    fn deserialize_dedups_dependencies() {
        let task: Task = serde_json::from_value(json!({
            "name": "t",
            "type": "generate_code",
            "depends_on": ["a", "b", "a"],
        }))
        .unwrap();
        assert_eq!(task.dependencies(), ["a", "b"]);
        assert_eq!(task.task_type, TaskType::GenerateCode);
        assert!(task.params.is_empty());
    }
}

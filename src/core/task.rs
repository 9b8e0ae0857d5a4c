//! Task tree model: the recursive decomposition of a development request.
//!
//! A `Task` with children is a composite node and is never code-generated
//! itself; only leaves with `to_be_coded=true` and a file path cause writes.
//! Task ids are assigned top-down as `<parent_id>_<child_index>`, so the
//! ancestor relationship is exactly the string-prefix relationship.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
    Error,
}

/// What kind of artifact a leaf describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Function,
    File,
    Folder,
    Class,
    Module,
}

impl ArtifactKind {
    /// Tolerant lookup from model output (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "function" => Some(Self::Function),
            "file" => Some(Self::File),
            "folder" => Some(Self::Folder),
            "class" => Some(Self::Class),
            "module" => Some(Self::Module),
            _ => None,
        }
    }
}

/// Implementation metadata attached to code-generation leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImplementationDetails {
    /// Artifact kind; the wire key is `TYPE` (model contract).
    #[serde(rename = "TYPE", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
    pub expected_loc: u32,
    pub to_be_coded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logic: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_usage: Option<String>,
}

/// A node in the recursive task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub subtasks: Vec<Task>,
    /// Model-declared request for further decomposition of this node.
    #[serde(rename = "subtasks_necessary", skip_serializing_if = "std::ops::Not::not")]
    pub needs_decomposition: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_details: Option<ImplementationDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Task {
    /// Sentinel returned when decomposition fails terminally. The bad branch
    /// stays visible in the tree instead of aborting the run.
    pub fn error_sentinel(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: "Error".to_string(),
            description: message.clone(),
            status: TaskStatus::Error,
            error_message: Some(message),
            ..Self::default()
        }
    }

    /// A leaf is code-generation eligible when it has no children, carries a
    /// destination path, and its implementation details opt in.
    pub fn is_codable(&self) -> bool {
        self.subtasks.is_empty()
            && self.file_path.is_some()
            && self
                .implementation_details
                .as_ref()
                .is_some_and(|details| details.to_be_coded)
    }

    /// Assign ids top-down via depth-first traversal: the root becomes
    /// `task_0`, children derive `<parent_id>_<index>`. Existing ids are
    /// overwritten so the whole tree is consistent after a reshape.
    pub fn assign_task_ids(&mut self) {
        self.assign_ids_from("task_0");
    }

    fn assign_ids_from(&mut self, id: &str) {
        self.task_id = Some(id.to_string());
        for (index, child) in self.subtasks.iter_mut().enumerate() {
            child.assign_ids_from(&format!("{id}_{index}"));
        }
    }

    /// Pre-order flatten: every node exactly once, parent before child.
    pub fn flatten(&self) -> Vec<&Task> {
        let mut nodes = Vec::new();
        self.flatten_into(&mut nodes);
        nodes
    }

    fn flatten_into<'a>(&'a self, nodes: &mut Vec<&'a Task>) {
        nodes.push(self);
        for child in &self.subtasks {
            child.flatten_into(nodes);
        }
    }

    /// Find a node by task id.
    pub fn find(&self, id: &str) -> Option<&Task> {
        if self.task_id.as_deref() == Some(id) {
            return Some(self);
        }
        self.subtasks.iter().find_map(|child| child.find(id))
    }

    /// Find a node by task id, mutably.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        if self.task_id.as_deref() == Some(id) {
            return Some(self);
        }
        self.subtasks.iter_mut().find_map(|child| child.find_mut(id))
    }

    pub fn node_count(&self) -> usize {
        1 + self.subtasks.iter().map(Task::node_count).sum::<usize>()
    }

    /// Indented one-line-per-node rendering for logs and the `tree` command.
    pub fn summarize(&self, max_nodes: usize) -> String {
        let mut lines = Vec::new();
        self.summarize_inner(0, max_nodes, &mut lines);
        lines.join("\n")
    }

    fn summarize_inner(&self, depth: usize, max_nodes: usize, lines: &mut Vec<String>) {
        if lines.len() >= max_nodes {
            return;
        }
        let indent = "  ".repeat(depth);
        let marker = match self.status {
            TaskStatus::Completed => "✓",
            TaskStatus::Error => "✗",
            TaskStatus::Pending => "-",
        };
        let id = self.task_id.as_deref().unwrap_or("?");
        let file = self.file_path.as_deref().unwrap_or("");
        lines.push(format!("{indent}{marker} {} [{id}] {file}", self.name));
        for child in &self.subtasks {
            child.summarize_inner(depth + 1, max_nodes, lines);
        }
    }
}

/// Check structural invariants: unique ids, and child ids deriving from the
/// parent id (the prefix property used for status lookups).
pub fn validate_invariants(root: &Task) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    check_node(root, None, &mut seen, &mut errors);
    errors
}

fn check_node(
    node: &Task,
    parent_id: Option<&str>,
    seen: &mut std::collections::BTreeSet<String>,
    errors: &mut Vec<String>,
) {
    if let Some(id) = &node.task_id {
        if !seen.insert(id.clone()) {
            errors.push(format!("duplicate id {id}"));
        }
        if let Some(parent) = parent_id
            && !id.starts_with(&format!("{parent}_"))
        {
            errors.push(format!("id {id} does not derive from parent {parent}"));
        }
    } else if parent_id.is_some() {
        errors.push(format!("node '{}' is missing a task id", node.name));
    }
    for child in &node.subtasks {
        check_node(child, node.task_id.as_deref(), seen, errors);
    }
}

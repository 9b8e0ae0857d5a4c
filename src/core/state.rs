//! Project state snapshot: the externally visible checkpoint for resuming a
//! partially built project.
//!
//! The in-memory task tree is canonical; the state is rebuilt from it before
//! every save rather than maintained independently.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::task::{Task, TaskStatus};

/// Persisted checkpoint (`project_state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub user_prompt: String,
    pub structured_prompt: String,
    pub task_tree: Task,
    pub completed_tasks: BTreeSet<String>,
    pub error_tasks: BTreeMap<String, String>,
    pub last_executed: Option<String>,
}

impl ProjectState {
    /// Rebuild the snapshot from the canonical tree. Completed and errored
    /// ids are derived from node statuses; nodes without ids are skipped.
    pub fn snapshot(
        user_prompt: &str,
        structured_prompt: &str,
        tree: &Task,
        last_executed: Option<String>,
    ) -> Self {
        let mut completed_tasks = BTreeSet::new();
        let mut error_tasks = BTreeMap::new();
        for node in tree.flatten() {
            let Some(id) = &node.task_id else { continue };
            match node.status {
                TaskStatus::Completed => {
                    completed_tasks.insert(id.clone());
                }
                TaskStatus::Error => {
                    let message = node
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string());
                    error_tasks.insert(id.clone(), message);
                }
                TaskStatus::Pending => {}
            }
        }
        Self {
            user_prompt: user_prompt.to_string(),
            structured_prompt: structured_prompt.to_string(),
            task_tree: tree.clone(),
            completed_tasks,
            error_tasks,
            last_executed,
        }
    }
}

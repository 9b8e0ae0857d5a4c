//! Project state storage with schema validation on load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::state::ProjectState;
use crate::core::task::validate_invariants;

const TASK_TREE_SCHEMA: &str = include_str!("../../schemas/task_tree.schema.json");

/// Load project state from disk, validating the embedded task tree
/// against the schema and the task-id invariants.
pub fn load_state(path: &Path) -> Result<ProjectState> {
    debug!(path = %path.display(), "loading project state");
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read project state {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse project state {}", path.display()))?;

    let tree_value = value
        .get("task_tree")
        .ok_or_else(|| anyhow!("project state missing task_tree {}", path.display()))?;
    validate_schema(tree_value)?;

    let state: ProjectState = serde_json::from_value(value)
        .with_context(|| format!("deserialize project state {}", path.display()))?;

    let errors = validate_invariants(&state.task_tree);
    if !errors.is_empty() {
        return Err(anyhow!("task tree invariants failed: {}", errors.join("; ")));
    }
    debug!(
        completed = state.completed_tasks.len(),
        errors = state.error_tasks.len(),
        "project state loaded"
    );
    Ok(state)
}

/// Atomically write project state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &ProjectState) -> Result<()> {
    debug!(path = %path.display(), "writing project state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn validate_schema(tree: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(TASK_TREE_SCHEMA).context("parse task tree schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(tree) {
        let messages = compiled
            .iter_errors(tree)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "task tree schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp project state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace project state {}", path.display()))?;
    Ok(())
}

//! Tolerant mapping from untyped model output into the typed task tree.
//!
//! The backing model is free to misbehave in enumerable ways: wrap JSON in
//! markdown fences, return a list instead of an object, or emit bare strings
//! where objects were requested. This module coerces the recognized shapes
//! and rejects the rest so the decomposer can retry.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::core::task::{ArtifactKind, ImplementationDetails, Task};

/// Why a model response could not be turned into a task document.
///
/// All variants are retryable: the decomposer regenerates the response up to
/// its attempt bound before degrading to a sentinel node.
#[derive(Debug, Error)]
pub enum TaskParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    Empty,
    #[error("unexpected root shape: {0}")]
    UnexpectedRoot(String),
}

static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[^\n]*$").expect("fence regex should be valid"));
static HTML_WRAPPERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?code>|</?pre>").expect("wrapper regex should be valid"));

/// Strip markdown code fences and stray `<code>`/`<pre>` wrappers.
///
/// Used for both JSON documents and generated source text; the surviving
/// content is trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    let without_fences = FENCE_LINE.replace_all(raw, "");
    HTML_WRAPPERS.replace_all(&without_fences, "").trim().to_string()
}

/// Parse a decomposition response into a task tree.
///
/// Recognized failure modes, per the model contract:
/// - list root: wrapped into a synthetic composite whose subtasks are the
///   list elements;
/// - string subtask: treated as an atomic leaf description;
/// - anything else at the root is an error, triggering regeneration.
pub fn parse_task_document(raw: &str) -> Result<Task, TaskParseError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(TaskParseError::Empty);
    }
    let value: Value = serde_json::from_str(&cleaned)?;
    match value {
        Value::Object(map) => Ok(task_from_object(&map)),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(TaskParseError::UnexpectedRoot("empty list".to_string()));
            }
            Ok(Task {
                name: "root".to_string(),
                description: "decomposed task list".to_string(),
                subtasks: items.iter().map(task_from_value).collect(),
                ..Task::default()
            })
        }
        other => Err(TaskParseError::UnexpectedRoot(json_type_name(&other).to_string())),
    }
}

/// Coerce any subtask payload into a task. Strings become atomic leaves and
/// are never decomposed further; unrecognized scalars are stringified.
pub fn task_from_value(value: &Value) -> Task {
    match value {
        Value::Object(map) => task_from_object(map),
        Value::String(text) => Task {
            name: text.clone(),
            description: text.clone(),
            ..Task::default()
        },
        other => {
            let rendered = other.to_string();
            Task {
                name: rendered.clone(),
                description: rendered,
                ..Task::default()
            }
        }
    }
}

fn task_from_object(map: &serde_json::Map<String, Value>) -> Task {
    let subtasks = match map.get("subtasks") {
        Some(Value::Array(items)) => items.iter().map(task_from_value).collect(),
        _ => Vec::new(),
    };

    Task {
        name: string_field(map, "name").unwrap_or_default(),
        description: string_field(map, "description").unwrap_or_default(),
        subtasks,
        needs_decomposition: bool_field(map, "subtasks_necessary"),
        function_name: string_field(map, "function_name"),
        parameters: parameters_field(map.get("parameters")),
        return_type: string_field(map, "return_type"),
        file_path: string_field(map, "file_path"),
        implementation_details: map.get("implementation_details").and_then(details_from_value),
        language: string_field(map, "language"),
        framework: string_field(map, "framework"),
        ..Task::default()
    }
}

fn details_from_value(value: &Value) -> Option<ImplementationDetails> {
    let map = value.as_object()?;
    Some(ImplementationDetails {
        kind: map
            .get("TYPE")
            .and_then(Value::as_str)
            .and_then(ArtifactKind::from_label),
        expected_loc: map
            .get("expected_loc")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        to_be_coded: map.get("to_be_coded").is_some_and(truthy),
        logic: logic_field(map.get("logic")),
        dependencies: map
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        example_usage: map
            .get("example_usage")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// `logic` arrives either as free text or as a list of steps.
fn logic_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn parameters_field(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(key, value)| {
            let label = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), label)
        })
        .collect()
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn bool_field(map: &serde_json::Map<String, Value>, key: &str) -> bool {
    map.get(key).is_some_and(truthy)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences_before_parsing() {
        let raw = "```json\n{\"name\": \"t\", \"description\": \"d\", \"subtasks\": []}\n```";
        let task = parse_task_document(raw).expect("parse");
        assert_eq!(task.name, "t");
        assert_eq!(task.description, "d");
        assert!(task.subtasks.is_empty());
    }

    #[test]
    fn list_root_is_wrapped_in_synthetic_composite() {
        let raw = r#"[
            {"name": "a", "description": "first", "subtasks": []},
            {"name": "b", "description": "second", "subtasks": []}
        ]"#;
        let task = parse_task_document(raw).expect("parse");
        assert_eq!(task.name, "root");
        assert_eq!(task.subtasks.len(), 2);
        assert_eq!(task.subtasks[0].name, "a");
        assert_eq!(task.subtasks[1].name, "b");
    }

    #[test]
    fn bare_string_subtask_becomes_atomic_leaf() {
        let raw = r#"{"name": "t", "description": "d", "subtasks": ["write docs"]}"#;
        let task = parse_task_document(raw).expect("parse");
        assert_eq!(task.subtasks.len(), 1);
        let leaf = &task.subtasks[0];
        assert_eq!(leaf.name, "write docs");
        assert_eq!(leaf.description, "write docs");
        assert!(leaf.subtasks.is_empty());
        assert!(!leaf.needs_decomposition);
    }

    #[test]
    fn scalar_root_is_rejected() {
        let err = parse_task_document("42").expect_err("should reject");
        assert!(matches!(err, TaskParseError::UnexpectedRoot(_)));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = parse_task_document("{not json").expect_err("should reject");
        assert!(matches!(err, TaskParseError::Json(_)));
    }

    #[test]
    fn implementation_details_are_coerced() {
        let raw = r#"{
            "name": "t", "description": "d", "subtasks": [],
            "file_path": "./app/t.py",
            "implementation_details": {
                "TYPE": "Function",
                "expected_loc": 12,
                "to_be_coded": "true",
                "logic": ["step one", "step two"],
                "dependencies": ["requests"],
                "example_usage": "t()"
            }
        }"#;
        let task = parse_task_document(raw).expect("parse");
        let details = task.implementation_details.clone().expect("details");
        assert_eq!(details.kind, Some(ArtifactKind::Function));
        assert_eq!(details.expected_loc, 12);
        assert!(details.to_be_coded);
        assert_eq!(details.logic.as_deref(), Some("step one\nstep two"));
        assert_eq!(details.dependencies, vec!["requests".to_string()]);
        assert!(task.is_codable());
    }

    #[test]
    fn null_optional_fields_stay_none() {
        let raw = r#"{
            "name": "t", "description": "d", "subtasks": [],
            "function_name": null, "file_path": null, "return_type": null
        }"#;
        let task = parse_task_document(raw).expect("parse");
        assert!(task.function_name.is_none());
        assert!(task.file_path.is_none());
        assert!(task.return_type.is_none());
    }

    #[test]
    fn subtasks_necessary_flag_is_captured() {
        let raw = r#"{
            "name": "t", "description": "d",
            "subtasks": [{"name": "s", "description": "sd", "subtasks": [], "subtasks_necessary": true}]
        }"#;
        let task = parse_task_document(raw).expect("parse");
        assert!(task.subtasks[0].needs_decomposition);
    }

    #[test]
    fn strip_code_fences_removes_html_wrappers_too() {
        let cleaned = strip_code_fences("<code>print('x')</code>");
        assert_eq!(cleaned, "print('x')");
    }
}

//! Lifecycle tests driving the full pipeline with scripted doubles.
//!
//! These tests exercise the whole chain end to end: stack detection, prompt
//! structuring, decomposition, file generation, checkpointing, and the
//! execute-and-debug loop, without touching the network or an interpreter.

use std::fs;
use std::path::Path;
use std::process::Command;

use taskforge::core::state::ProjectState;
use taskforge::core::task::TaskStatus;
use taskforge::io::config::ForgeConfig;
use taskforge::io::state_store::{load_state, write_state};
use taskforge::pipeline::run_pipeline;
use taskforge::repair::RunVerdict;
use taskforge::test_support::{ScriptedClient, ScriptedRunner, codable_leaf, node_with_children};

fn test_config(root: &Path) -> ForgeConfig {
    ForgeConfig {
        output_root: root.join("app"),
        state_path: root.join("project_state.json"),
        ..ForgeConfig::default()
    }
}

fn decomposition(file_path: &Path) -> String {
    format!(
        r#"{{
            "name": "todo script", "description": "a small script",
            "subtasks": [{{
                "name": "main", "description": "entry point",
                "subtasks": [],
                "file_path": "{}",
                "implementation_details": {{"TYPE": "file", "to_be_coded": true}}
            }}]
        }}"#,
        file_path.display()
    )
}

/// Full lifecycle with one repair cycle.
///
/// Scripted sequence:
/// 1. Detect stack (python), structure the request, decompose to one leaf.
/// 2. Generate `main.py`, checkpoint state, write the README.
/// 3. First run fails with a traceback; the repair plan regenerates the file.
/// 4. Second run succeeds and the final state records the execution time.
#[test]
fn full_lifecycle_repairs_a_failing_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path());
    let main_path = config.output_root.join("main.py");

    let client = ScriptedClient::new(vec![
        Ok(r#"{"language": "python", "framework": null}"#.to_string()),
        Ok("write a script that prints todo items".to_string()),
        Ok(decomposition(&main_path)),
        Ok("print(todos)".to_string()),
        // Repair: decomposition of the repair brief, then the rewritten file.
        Ok(decomposition(&main_path)),
        Ok("todos = []\nprint(todos)".to_string()),
    ]);
    let runner = ScriptedRunner::new(vec![
        RunVerdict::Failed {
            stderr: concat!(
                "Traceback (most recent call last):\n",
                "  File \"main.py\", line 1, in <module>\n",
                "NameError: name 'todos' is not defined\n",
            )
            .to_string(),
        },
        RunVerdict::Success,
    ]);

    let outcome = run_pipeline(&client, &runner, &config, "todo list script").expect("pipeline");

    assert_eq!(client.calls(), 6);
    assert_eq!(runner.runs(), 2);
    assert_eq!(outcome.files_built, 1);
    assert_eq!(outcome.repair.attempts, 1);
    assert!(outcome.repair.is_healthy());

    // The repair rewrote the whole file with the second script.
    assert_eq!(
        fs::read_to_string(&main_path).expect("read main"),
        "todos = []\nprint(todos)"
    );

    let saved = load_state(&config.state_path).expect("load state");
    assert_eq!(saved.user_prompt, "todo list script");
    assert!(saved.completed_tasks.contains("task_0_0"));
    assert!(saved.last_executed.is_some());

    let readme = fs::read_to_string(temp.path().join("README.md")).expect("read readme");
    assert!(readme.contains("todo list script"));
}

/// An unfixable project ends with a failed verdict but still checkpoints.
#[test]
fn exhausted_repairs_still_persist_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path());
    let main_path = config.output_root.join("main.py");

    let client = ScriptedClient::new(vec![
        Ok(r#"{"language": "python", "framework": null}"#.to_string()),
        Ok("a brief".to_string()),
        Ok(decomposition(&main_path)),
        Ok("print('v1')".to_string()),
        Ok(decomposition(&main_path)),
        Ok("print('v2')".to_string()),
    ]);
    // Two distinct failures; the budget of one repair is then spent.
    let runner = ScriptedRunner::new(vec![
        RunVerdict::Failed { stderr: "SyntaxError: invalid syntax".to_string() },
        RunVerdict::Failed { stderr: "ValueError: bad input".to_string() },
    ]);

    let mut tight = config.clone();
    tight.max_repair_attempts = 1;
    let outcome = run_pipeline(&client, &runner, &tight, "broken script").expect("pipeline");

    assert!(!outcome.repair.is_healthy());
    assert_eq!(outcome.repair.attempts, 1);
    assert!(config.state_path.exists());
}

/// `tree` reads a checkpoint directly and needs no credentials.
#[test]
fn tree_command_prints_the_checkpointed_tasks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let state_path = temp.path().join("project_state.json");

    let mut tree = node_with_children(
        "todo api",
        vec![codable_leaf("store", "./app/store.py"), codable_leaf("routes", "./app/routes.py")],
    );
    tree.assign_task_ids();
    tree.subtasks[0].status = TaskStatus::Completed;
    write_state(
        &state_path,
        &ProjectState::snapshot("build a todo api", "brief", &tree, None),
    )
    .expect("seed state");

    let output = Command::new(env!("CARGO_BIN_EXE_taskforge"))
        .current_dir(temp.path())
        .args(["tree", "--state"])
        .arg(&state_path)
        .output()
        .expect("run tree");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("todo api"));
    assert!(stdout.contains("✓ store"));
    assert!(stdout.contains("- routes"));
}

/// A missing checkpoint is a clean error with a nonzero exit.
#[test]
fn tree_command_fails_without_a_checkpoint() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_taskforge"))
        .current_dir(temp.path())
        .args(["tree", "--state", "missing.json"])
        .output()
        .expect("run tree");

    assert_eq!(output.status.code(), Some(1));
}

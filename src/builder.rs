//! Project builder: walks the task tree and materializes codable leaves as
//! files under the output root.
//!
//! Per-leaf failures are isolated. A leaf that cannot be generated is marked
//! `error` on the tree and the walk continues, so one bad model response
//! never discards the rest of the build.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::lang::LanguageProfile;
use crate::core::parse::strip_code_fences;
use crate::core::paths::normalize_output_path;
use crate::core::task::{ArtifactKind, Task, TaskStatus};
use crate::io::gateway::{ChatRequest, ModelClient, ModelRole};
use crate::io::prompt::PromptLibrary;

/// Files produced by one build pass, keyed by destination path. When two
/// leaves target the same file the later one wins.
pub type BuiltFiles = BTreeMap<PathBuf, String>;

/// Walk the tree in pre-order and write every codable leaf.
///
/// `skip` holds task ids already completed in a previous run; their files are
/// assumed present and are not regenerated. `on_progress` runs after every
/// processed leaf so callers can checkpoint the tree.
#[allow(clippy::too_many_arguments)]
pub fn build_project<C: ModelClient>(
    client: &C,
    prompts: &PromptLibrary,
    tree: &mut Task,
    profile: &LanguageProfile,
    framework: Option<&str>,
    output_root: &Path,
    skip: &BTreeSet<String>,
    mut on_progress: impl FnMut(&Task) -> Result<()>,
) -> Result<BuiltFiles> {
    let leaf_ids: Vec<String> = tree
        .flatten()
        .iter()
        .filter(|node| node.is_codable())
        .filter_map(|node| node.task_id.clone())
        .collect();
    info!(leaves = leaf_ids.len(), root = %output_root.display(), "building project");

    let mut built = BuiltFiles::new();
    for id in leaf_ids {
        if skip.contains(&id) {
            debug!(id = %id, "already completed, skipping");
            continue;
        }
        let Some(task) = tree.find_mut(&id) else {
            continue;
        };

        match generate_leaf(client, prompts, task, profile, framework, output_root) {
            Ok(Some((path, contents))) => {
                task.status = TaskStatus::Completed;
                task.error_message = None;
                built.insert(path, contents);
            }
            Ok(None) => {
                task.status = TaskStatus::Completed;
                task.error_message = None;
            }
            Err(err) => {
                warn!(id = %id, err = %err, "leaf generation failed");
                task.status = TaskStatus::Error;
                task.error_message = Some(format!("{err:#}"));
            }
        }
        on_progress(tree).context("checkpoint after leaf")?;
    }
    Ok(built)
}

/// Generate one leaf. Returns the written file, or `None` when the leaf
/// produced a directory.
fn generate_leaf<C: ModelClient>(
    client: &C,
    prompts: &PromptLibrary,
    task: &mut Task,
    profile: &LanguageProfile,
    framework: Option<&str>,
    output_root: &Path,
) -> Result<Option<(PathBuf, String)>> {
    let raw_path = task
        .file_path
        .clone()
        .context("codable leaf without file path")?;
    let path = normalize_output_path(&raw_path, output_root);
    // Record the effective destination so resumed runs agree with the disk.
    task.file_path = Some(path.display().to_string());

    let kind = task
        .implementation_details
        .as_ref()
        .and_then(|details| details.kind);
    if kind == Some(ArtifactKind::Folder) {
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
        debug!(path = %path.display(), "created directory");
        return Ok(None);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }

    if !profile.matches_extension(&path) {
        // Config files, manifests and the like get a placeholder; the model
        // only writes source files.
        fs::write(&path, "").with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "created empty non-source file");
        return Ok(Some((path, String::new())));
    }

    let prompt = prompts.coder(task, profile, framework)?;
    let response = client.complete(&ChatRequest {
        role: ModelRole::Coding,
        prompt,
        temperature: 0.1,
    })?;
    let code = strip_code_fences(&response);
    if code.is_empty() {
        anyhow::bail!("model returned empty code for {}", path.display());
    }

    fs::write(&path, &code).with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), bytes = code.len(), "wrote generated file");
    Ok(Some((path, code)))
}

/// Write a README describing the generated project at `readme_path`.
pub fn write_readme(
    readme_path: &Path,
    user_prompt: &str,
    structured_prompt: &str,
    built: &BuiltFiles,
) -> Result<()> {
    let mut contents = String::from("# Generated Project\n\n");
    contents.push_str("## Request\n\n");
    contents.push_str(user_prompt.trim());
    contents.push_str("\n\n## Brief\n\n");
    contents.push_str(structured_prompt.trim());
    contents.push_str("\n\n## Files\n\n");
    for path in built.keys() {
        contents.push_str(&format!("- `{}`\n", path.display()));
    }
    fs::write(readme_path, contents)
        .with_context(|| format!("write {}", readme_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lang::profile_for;
    use crate::test_support::{ScriptedClient, codable_leaf, leaf, node_with_children};

    fn build(
        client: &ScriptedClient,
        tree: &mut Task,
        output_root: &Path,
    ) -> Result<BuiltFiles> {
        let prompts = PromptLibrary::new();
        build_project(
            client,
            &prompts,
            tree,
            profile_for(Some("python")),
            None,
            output_root,
            &BTreeSet::new(),
            |_| Ok(()),
        )
    }

    #[test]
    fn codable_leaf_is_written_to_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut tree = node_with_children(
            "project",
            vec![codable_leaf("store", root.join("store.py").to_str().unwrap())],
        );
        tree.assign_task_ids();

        let client = ScriptedClient::new(vec![Ok("```python\ndef add():\n    pass\n```".to_string())]);
        let built = build(&client, &mut tree, &root).expect("build");

        assert_eq!(built.len(), 1);
        let written = fs::read_to_string(root.join("store.py")).expect("read");
        assert_eq!(written, "def add():\n    pass");
        assert_eq!(tree.subtasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn non_codable_nodes_produce_no_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut plain = leaf("notes");
        plain.file_path = Some(root.join("notes.py").display().to_string());
        // No implementation details, so to_be_coded is absent.
        let mut tree = node_with_children("project", vec![plain]);
        tree.assign_task_ids();

        let client = ScriptedClient::new(Vec::new());
        let built = build(&client, &mut tree, &root).expect("build");

        assert!(built.is_empty());
        assert_eq!(client.calls(), 0);
        assert!(!root.join("notes.py").exists());
    }

    #[test]
    fn foreign_paths_are_pulled_under_the_output_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut tree = node_with_children(
            "project",
            vec![codable_leaf("main", "/somewhere/else/main.py")],
        );
        tree.assign_task_ids();

        let client = ScriptedClient::new(vec![Ok("print('hi')".to_string())]);
        let built = build(&client, &mut tree, &root).expect("build");

        let expected = root.join("main.py");
        assert!(built.contains_key(&expected));
        assert!(expected.exists());
        assert_eq!(
            tree.subtasks[0].file_path.as_deref(),
            Some(expected.display().to_string().as_str())
        );
    }

    #[test]
    fn leaf_failure_is_isolated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut tree = node_with_children(
            "project",
            vec![
                codable_leaf("bad", root.join("bad.py").to_str().unwrap()),
                codable_leaf("good", root.join("good.py").to_str().unwrap()),
            ],
        );
        tree.assign_task_ids();

        // Empty code is a generation failure for the first leaf.
        let client = ScriptedClient::new(vec![
            Ok(String::new()),
            Ok("print('ok')".to_string()),
        ]);
        let built = build(&client, &mut tree, &root).expect("build");

        assert_eq!(built.len(), 1);
        assert_eq!(tree.subtasks[0].status, TaskStatus::Error);
        assert!(tree.subtasks[0].error_message.is_some());
        assert_eq!(tree.subtasks[1].status, TaskStatus::Completed);
        assert!(root.join("good.py").exists());
    }

    #[test]
    fn folder_leaves_create_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut folder = codable_leaf("pkg", root.join("pkg").to_str().unwrap());
        folder.implementation_details.as_mut().unwrap().kind = Some(ArtifactKind::Folder);
        let mut tree = node_with_children("project", vec![folder]);
        tree.assign_task_ids();

        let client = ScriptedClient::new(Vec::new());
        let built = build(&client, &mut tree, &root).expect("build");

        assert!(built.is_empty());
        assert!(root.join("pkg").is_dir());
        assert_eq!(tree.subtasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn non_source_extension_gets_an_empty_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut tree = node_with_children(
            "project",
            vec![codable_leaf("reqs", root.join("requirements.txt").to_str().unwrap())],
        );
        tree.assign_task_ids();

        let client = ScriptedClient::new(Vec::new());
        let built = build(&client, &mut tree, &root).expect("build");

        assert_eq!(client.calls(), 0);
        assert!(built.contains_key(&root.join("requirements.txt")));
        assert!(root.join("requirements.txt").exists());
    }

    #[test]
    fn skip_set_suppresses_regeneration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut tree = node_with_children(
            "project",
            vec![codable_leaf("store", root.join("store.py").to_str().unwrap())],
        );
        tree.assign_task_ids();

        let skip: BTreeSet<String> = ["task_0_0".to_string()].into_iter().collect();
        let client = ScriptedClient::new(Vec::new());
        let prompts = PromptLibrary::new();
        let built = build_project(
            &client,
            &prompts,
            &mut tree,
            profile_for(Some("python")),
            None,
            &root,
            &skip,
            |_| Ok(()),
        )
        .expect("build");

        assert!(built.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn progress_callback_runs_per_leaf() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let mut tree = node_with_children(
            "project",
            vec![
                codable_leaf("a", root.join("a.py").to_str().unwrap()),
                codable_leaf("b", root.join("b.py").to_str().unwrap()),
            ],
        );
        tree.assign_task_ids();

        let client = ScriptedClient::new(vec![
            Ok("print('a')".to_string()),
            Ok("print('b')".to_string()),
        ]);
        let prompts = PromptLibrary::new();
        let mut checkpoints = 0usize;
        build_project(
            &client,
            &prompts,
            &mut tree,
            profile_for(Some("python")),
            None,
            &root,
            &BTreeSet::new(),
            |snapshot| {
                checkpoints += 1;
                assert!(snapshot.node_count() >= 3);
                Ok(())
            },
        )
        .expect("build");

        assert_eq!(checkpoints, 2);
    }

    #[test]
    fn readme_lists_generated_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let readme = temp.path().join("README.md");
        let mut built = BuiltFiles::new();
        built.insert(PathBuf::from("./app/main.py"), "code".to_string());

        write_readme(&readme, "make a thing", "a structured brief", &built).expect("write");
        let contents = fs::read_to_string(&readme).expect("read");
        assert!(contents.contains("make a thing"));
        assert!(contents.contains("./app/main.py"));
    }
}

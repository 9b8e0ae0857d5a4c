//! Recursive task decomposition with bounded retries.
//!
//! Each tree level costs one model call. Unparseable output is regenerated up
//! to the retry bound, after which the branch degrades to an error sentinel
//! so the rest of the tree still builds.

use tracing::{debug, info, warn};

use crate::core::parse::parse_task_document;
use crate::core::task::Task;
use crate::io::gateway::{ChatRequest, ModelClient, ModelRole};
use crate::io::prompt::PromptLibrary;

/// Bounds for one decomposition run.
#[derive(Debug, Clone, Copy)]
pub struct DecomposerConfig {
    /// Model calls per tree level before the branch degrades to a sentinel.
    pub max_retries: u32,
    /// Levels below which `subtasks_necessary` requests are ignored.
    pub max_depth: u32,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_depth: 4,
        }
    }
}

/// Decomposer agent bound to one target stack.
pub struct DecomposerAgent<'a, C: ModelClient> {
    client: &'a C,
    prompts: &'a PromptLibrary,
    config: DecomposerConfig,
    language: String,
    framework: Option<String>,
}

impl<'a, C: ModelClient> DecomposerAgent<'a, C> {
    pub fn new(
        client: &'a C,
        prompts: &'a PromptLibrary,
        config: DecomposerConfig,
        language: &str,
        framework: Option<&str>,
    ) -> Self {
        Self {
            client,
            prompts,
            config,
            language: language.to_string(),
            framework: framework.map(str::to_string),
        }
    }

    /// Decompose a structured brief into a fully expanded, id-assigned tree.
    ///
    /// Never returns an error: terminal failures surface as sentinel nodes
    /// inside the tree.
    pub fn decompose(&self, description: &str) -> Task {
        let mut root = self.decompose_level(description, None, 0);
        root.assign_task_ids();
        info!(nodes = root.node_count(), "decomposition finished");
        root
    }

    /// One model call for one tree level, with retries on unusable output.
    fn decompose_level(&self, description: &str, parent: Option<&str>, depth: u32) -> Task {
        for attempt in 1..=self.config.max_retries {
            let prompt = match self.prompts.decomposer(
                description,
                parent,
                &self.language,
                self.framework.as_deref(),
            ) {
                Ok(prompt) => prompt,
                Err(err) => {
                    warn!(attempt, err = %err, "decomposer prompt failed");
                    continue;
                }
            };

            let raw = match self.client.complete(&ChatRequest {
                role: ModelRole::Reasoning,
                prompt,
                temperature: 0.2,
            }) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        depth,
                        err = %err,
                        "decomposition request failed"
                    );
                    continue;
                }
            };

            match parse_task_document(&raw) {
                Ok(mut task) => {
                    self.expand_requested_subtasks(&mut task, depth);
                    return task;
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        depth,
                        err = %err,
                        "unparseable decomposition output, regenerating"
                    );
                }
            }
        }
        warn!(depth, "decomposition retries exhausted, inserting sentinel");
        Task::error_sentinel(format!(
            "decomposition failed after {} attempts",
            self.config.max_retries
        ))
    }

    /// Expand subtasks that asked for further decomposition, up to the depth
    /// cap. The flag is always cleared so resumed trees do not re-expand.
    fn expand_requested_subtasks(&self, task: &mut Task, depth: u32) {
        let parent_name = task.name.clone();
        for subtask in &mut task.subtasks {
            if subtask.needs_decomposition {
                subtask.needs_decomposition = false;
                if depth + 1 >= self.config.max_depth {
                    debug!(
                        name = %subtask.name,
                        depth = depth + 1,
                        "depth cap reached, keeping as leaf"
                    );
                } else {
                    let expansion = self.decompose_level(
                        &subtask.description,
                        Some(&parent_name),
                        depth + 1,
                    );
                    if expansion.status == crate::core::task::TaskStatus::Error {
                        subtask.status = expansion.status;
                        subtask.error_message = expansion.error_message;
                    } else if !expansion.subtasks.is_empty() {
                        subtask.subtasks = expansion.subtasks;
                    }
                }
            }
            self.expand_requested_subtasks_nested(subtask, depth + 1);
        }
    }

    fn expand_requested_subtasks_nested(&self, task: &mut Task, depth: u32) {
        if !task.subtasks.is_empty() {
            self.expand_requested_subtasks(task, depth);
        }
    }
}

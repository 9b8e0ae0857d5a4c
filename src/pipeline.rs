//! End-to-end pipeline: structure the request, decompose it, build the
//! project, then execute and repair it.
//!
//! The state checkpoint is rewritten after every generated file, so a killed
//! run resumes from the last completed leaf rather than starting over.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::agents::decomposer::{DecomposerAgent, DecomposerConfig};
use crate::agents::structurer::{detect_stack, structure_prompt};
use crate::builder::{build_project, write_readme};
use crate::core::lang::{LanguageProfile, profile_for};
use crate::core::state::ProjectState;
use crate::io::config::ForgeConfig;
use crate::io::gateway::ModelClient;
use crate::io::prompt::PromptLibrary;
use crate::io::state_store::{load_state, write_state};
use crate::repair::{ProjectRunner, RepairConfig, RepairReport, RunRequest, execute_and_debug};

/// What a pipeline run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: ProjectState,
    pub files_built: usize,
    pub repair: RepairReport,
}

impl ForgeConfig {
    fn decomposer(&self) -> DecomposerConfig {
        DecomposerConfig {
            max_retries: self.decompose_max_retries,
            max_depth: self.max_decompose_depth,
        }
    }

    fn repair(&self) -> RepairConfig {
        RepairConfig {
            max_attempts: self.max_repair_attempts,
            decomposer: self.decomposer(),
        }
    }

    fn run_request(&self, profile: &'static LanguageProfile) -> RunRequest {
        RunRequest {
            workdir: self.output_root.clone(),
            profile,
            timeout: self.run_timeout(),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    /// The README lands next to the state checkpoint.
    fn readme_path(&self) -> PathBuf {
        self.state_path.with_file_name("README.md")
    }
}

/// Run the whole pipeline for a fresh user request.
pub fn run_pipeline<C: ModelClient, R: ProjectRunner>(
    client: &C,
    runner: &R,
    config: &ForgeConfig,
    user_prompt: &str,
) -> Result<PipelineOutcome> {
    let prompts = PromptLibrary::new();

    let stack = detect_stack(client, &prompts, user_prompt, &config.default_language);
    let framework = config.framework.clone().or(stack.framework);
    let profile = profile_for(Some(stack.language.as_str()));
    info!(language = profile.name, framework = ?framework, "target stack selected");

    let structured =
        structure_prompt(client, &prompts, user_prompt, profile.name, framework.as_deref())?;

    let mut tree = DecomposerAgent::new(
        client,
        &prompts,
        config.decomposer(),
        profile.name,
        framework.as_deref(),
    )
    .decompose(&structured);
    tree.language = Some(profile.name.to_string());
    tree.framework = framework.clone();

    write_state(
        &config.state_path,
        &ProjectState::snapshot(user_prompt, &structured, &tree, None),
    )?;

    let built = build_project(
        client,
        &prompts,
        &mut tree,
        profile,
        framework.as_deref(),
        &config.output_root,
        &BTreeSet::new(),
        |snapshot| {
            write_state(
                &config.state_path,
                &ProjectState::snapshot(user_prompt, &structured, snapshot, None),
            )
        },
    )?;
    write_readme(&config.readme_path(), user_prompt, &structured, &built)?;

    let repair = execute_and_debug(
        client,
        &prompts,
        runner,
        profile,
        framework.as_deref(),
        &config.output_root,
        &config.run_request(profile),
        config.repair(),
    )?;

    let state = finalize(config, user_prompt, &structured, &tree)?;
    info!(
        files = built.len(),
        healthy = repair.is_healthy(),
        "pipeline finished"
    );
    Ok(PipelineOutcome {
        state,
        files_built: built.len(),
        repair,
    })
}

/// Resume a checkpointed run: completed leaves are kept, pending and errored
/// ones are regenerated, then the project is executed and repaired again.
pub fn resume_pipeline<C: ModelClient, R: ProjectRunner>(
    client: &C,
    runner: &R,
    config: &ForgeConfig,
) -> Result<PipelineOutcome> {
    let prompts = PromptLibrary::new();
    let saved = load_state(&config.state_path)
        .with_context(|| format!("no resumable state at {}", config.state_path.display()))?;
    info!(
        completed = saved.completed_tasks.len(),
        errors = saved.error_tasks.len(),
        "resuming from checkpoint"
    );

    let mut tree = saved.task_tree;
    let profile = stack_profile(&tree, config);
    let framework = config.framework.clone().or_else(|| tree.framework.clone());
    let user_prompt = saved.user_prompt;
    let structured = saved.structured_prompt;

    let built = build_project(
        client,
        &prompts,
        &mut tree,
        profile,
        framework.as_deref(),
        &config.output_root,
        &saved.completed_tasks,
        |snapshot| {
            write_state(
                &config.state_path,
                &ProjectState::snapshot(&user_prompt, &structured, snapshot, None),
            )
        },
    )?;

    let repair = execute_and_debug(
        client,
        &prompts,
        runner,
        profile,
        framework.as_deref(),
        &config.output_root,
        &config.run_request(profile),
        config.repair(),
    )?;

    let state = finalize(config, &user_prompt, &structured, &tree)?;
    Ok(PipelineOutcome {
        state,
        files_built: built.len(),
        repair,
    })
}

fn stack_profile(tree: &crate::core::task::Task, config: &ForgeConfig) -> &'static LanguageProfile {
    profile_for(
        tree.language
            .as_deref()
            .or(Some(config.default_language.as_str())),
    )
}

fn finalize(
    config: &ForgeConfig,
    user_prompt: &str,
    structured: &str,
    tree: &crate::core::task::Task,
) -> Result<ProjectState> {
    let executed_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format execution timestamp")?;
    let state = ProjectState::snapshot(user_prompt, structured, tree, Some(executed_at));
    write_state(&config.state_path, &state)?;
    Ok(state)
}

//! Execute-and-debug loop: run the generated project, and on failure ask the
//! model for a repair plan, rebuild the affected files, and try again.
//!
//! The loop is bounded twice over: by a fixed attempt budget and by a
//! no-progress check on the error signature. A run that keeps dying with the
//! same last stderr line is not being fixed by regeneration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::agents::decomposer::{DecomposerAgent, DecomposerConfig};
use crate::builder::build_project;
use crate::core::lang::LanguageProfile;
use crate::io::gateway::ModelClient;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptLibrary;

/// One request to run the generated project.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub workdir: PathBuf,
    pub profile: &'static LanguageProfile,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Outcome of one project run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunVerdict {
    Success,
    /// The run outlived its timeout without crashing. Long-lived processes
    /// (servers) are expected to do this, so it counts as healthy.
    LongRunning,
    /// No runnable entry file was found.
    NoEntry,
    Failed {
        stderr: String,
    },
}

/// Abstraction over project execution, so the repair loop is testable
/// without spawning interpreters.
pub trait ProjectRunner {
    fn run(&self, request: &RunRequest) -> Result<RunVerdict>;
}

/// Runs the project with the request profile's interpreter command.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandRunner;

impl ProjectRunner for CommandRunner {
    fn run(&self, request: &RunRequest) -> Result<RunVerdict> {
        let Some(entry) = find_entry(&request.workdir, request.profile)? else {
            return Ok(RunVerdict::NoEntry);
        };
        let argv = request.profile.run_command(&entry);
        debug!(argv = ?argv, workdir = %request.workdir.display(), "running project");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(&request.workdir);
        let output =
            run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)?;

        if output.timed_out {
            info!("run outlived its timeout, treating as long-running");
            return Ok(RunVerdict::LongRunning);
        }
        if output.status.success() {
            return Ok(RunVerdict::Success);
        }
        Ok(RunVerdict::Failed {
            stderr: output.stderr_text(),
        })
    }
}

/// Locate the file to execute: conventional entry names first, then any file
/// with the profile's source extension (lexicographic order for determinism).
pub(crate) fn find_entry(workdir: &Path, profile: &LanguageProfile) -> Result<Option<PathBuf>> {
    for candidate in profile.entry_candidates {
        if workdir.join(candidate).exists() {
            return Ok(Some(PathBuf::from(candidate)));
        }
    }

    if !workdir.exists() {
        return Ok(None);
    }
    let mut names: Vec<String> = std::fs::read_dir(workdir)
        .with_context(|| format!("read {}", workdir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| profile.matches_extension(&entry.path()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names.first().map(PathBuf::from))
}

static TRACEBACK_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"File "(?P<path>[^"]+)", line"#).expect("traceback regex should be valid")
});

/// Pull the failing file path out of an interpreter traceback, if present.
pub fn extract_failing_file(stderr: &str) -> Option<String> {
    TRACEBACK_FILE
        .captures_iter(stderr)
        .last()
        .map(|caps| caps["path"].to_string())
}

/// Collapse stderr to its last non-empty line. Two runs with the same
/// signature are treated as the same failure.
pub fn error_signature(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Bounds for the repair loop.
#[derive(Debug, Clone, Copy)]
pub struct RepairConfig {
    pub max_attempts: u32,
    pub decomposer: DecomposerConfig,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            decomposer: DecomposerConfig::default(),
        }
    }
}

/// How the repair loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    /// Repair cycles actually performed.
    pub attempts: u32,
    /// Final verdict of the last run.
    pub verdict: RunVerdict,
}

impl RepairReport {
    pub fn is_healthy(&self) -> bool {
        matches!(self.verdict, RunVerdict::Success | RunVerdict::LongRunning)
    }
}

/// Run the project and repair it until it is healthy or the budget is spent.
#[allow(clippy::too_many_arguments)]
pub fn execute_and_debug<C: ModelClient, R: ProjectRunner>(
    client: &C,
    prompts: &PromptLibrary,
    runner: &R,
    profile: &LanguageProfile,
    framework: Option<&str>,
    output_root: &Path,
    request: &RunRequest,
    config: RepairConfig,
) -> Result<RepairReport> {
    let mut last_signature: Option<String> = None;

    for attempt in 0..=config.max_attempts {
        let stderr = match runner.run(request).context("run project")? {
            RunVerdict::Failed { stderr } => stderr,
            healthy => {
                match healthy {
                    RunVerdict::Success => info!(attempt, "project ran cleanly"),
                    RunVerdict::LongRunning => {
                        info!(attempt, "project still running at timeout, assuming server");
                    }
                    RunVerdict::NoEntry => warn!("no entry file found, nothing to repair"),
                    RunVerdict::Failed { .. } => unreachable!(),
                }
                return Ok(RepairReport {
                    attempts: attempt,
                    verdict: healthy,
                });
            }
        };

        if attempt == config.max_attempts {
            warn!(attempts = attempt, "repair budget exhausted");
            return Ok(RepairReport {
                attempts: attempt,
                verdict: RunVerdict::Failed { stderr },
            });
        }

        let signature = error_signature(&stderr);
        if last_signature.as_deref() == Some(signature.as_str()) {
            warn!(signature = %signature, "same failure twice in a row, stopping");
            return Ok(RepairReport {
                attempts: attempt,
                verdict: RunVerdict::Failed { stderr },
            });
        }
        last_signature = Some(signature);

        let failing_file = extract_failing_file(&stderr);
        info!(
            attempt = attempt + 1,
            max_attempts = config.max_attempts,
            failing_file = ?failing_file,
            "attempting repair"
        );

        let repair_brief =
            prompts.repair(&stderr, failing_file.as_deref(), profile.name, framework)?;
        let mut repair_tree =
            DecomposerAgent::new(client, prompts, config.decomposer, profile.name, framework)
                .decompose(&repair_brief);
        build_project(
            client,
            prompts,
            &mut repair_tree,
            profile,
            framework,
            output_root,
            &BTreeSet::new(),
            |_| Ok(()),
        )
        .context("rebuild during repair")?;
    }
    unreachable!("loop returns on every verdict at the final attempt");
}

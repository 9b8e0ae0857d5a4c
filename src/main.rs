//! LLM-driven project generator.
//!
//! Takes a natural-language request, decomposes it into a task tree, writes
//! the generated files under the output root, then executes and repairs the
//! result. Progress is checkpointed to `project_state.json` so interrupted
//! runs can resume.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use taskforge::io::config::{DEFAULT_CONFIG_PATH, ForgeConfig, load_config};
use taskforge::io::gateway::{CredentialPool, OpenRouterGateway};
use taskforge::io::state_store::load_state;
use taskforge::pipeline::{PipelineOutcome, resume_pipeline, run_pipeline};
use taskforge::repair::CommandRunner;

#[derive(Parser)]
#[command(
    name = "taskforge",
    version,
    about = "LLM-driven project generator with recursive task decomposition"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a project from a natural-language request.
    Run {
        /// What to build.
        prompt: String,
    },
    /// Resume an interrupted run from the state checkpoint.
    Resume,
    /// Print the task tree from the state checkpoint.
    Tree {
        /// State file to read; defaults to the configured path.
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

fn main() {
    taskforge::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;

    match cli.command {
        Command::Run { prompt } => {
            let gateway = gateway(&config)?;
            let outcome = run_pipeline(&gateway, &CommandRunner, &config, &prompt)?;
            report(&outcome);
        }
        Command::Resume => {
            let gateway = gateway(&config)?;
            let outcome = resume_pipeline(&gateway, &CommandRunner, &config)?;
            report(&outcome);
        }
        Command::Tree { state } => {
            let path = state.unwrap_or_else(|| config.state_path.clone());
            let loaded = load_state(&path)?;
            println!("{}", loaded.task_tree.summarize(200));
        }
    }
    Ok(())
}

fn gateway(config: &ForgeConfig) -> Result<OpenRouterGateway> {
    let pool = CredentialPool::from_env().context("read credentials")?;
    OpenRouterGateway::new(pool, config.gateway()).context("build model gateway")
}

fn report(outcome: &PipelineOutcome) {
    println!(
        "built {} files, {} completed, {} errored",
        outcome.files_built,
        outcome.state.completed_tasks.len(),
        outcome.state.error_tasks.len()
    );
    if outcome.repair.is_healthy() {
        println!("project runs cleanly ({} repair cycles)", outcome.repair.attempts);
    } else {
        println!(
            "project still failing after {} repair cycles: {:?}",
            outcome.repair.attempts, outcome.repair.verdict
        );
    }
}

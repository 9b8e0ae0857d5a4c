//! Prompt rendering for the model-facing agents.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::lang::{LanguageProfile, PROFILES};
use crate::core::task::Task;

const STRUCTURER_TEMPLATE: &str = include_str!("prompts/structurer.md");
const DETECT_TEMPLATE: &str = include_str!("prompts/detect.md");
const DECOMPOSER_TEMPLATE: &str = include_str!("prompts/decomposer.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Template engine wrapper around minijinja.
///
/// Templates are compiled once at construction; rendering takes the
/// per-call context as arguments.
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptLibrary {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("structurer", STRUCTURER_TEMPLATE)
            .expect("structurer template should be valid");
        env.add_template("detect", DETECT_TEMPLATE)
            .expect("detect template should be valid");
        env.add_template("decomposer", DECOMPOSER_TEMPLATE)
            .expect("decomposer template should be valid");
        env.add_template("coder", CODER_TEMPLATE)
            .expect("coder template should be valid");
        env.add_template("repair", REPAIR_TEMPLATE)
            .expect("repair template should be valid");
        Self { env }
    }

    /// Prompt that turns a raw user request into a structured brief.
    pub fn structurer(
        &self,
        user_prompt: &str,
        language: &str,
        framework: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("structurer")?;
        template
            .render(context! {
                user_prompt => user_prompt.trim(),
                language => language,
                framework => framework,
            })
            .context("render structurer prompt")
    }

    /// Prompt asking the model to name the target language and framework.
    pub fn detect(&self, user_prompt: &str) -> Result<String> {
        let languages: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        let template = self.env.get_template("detect")?;
        template
            .render(context! {
                user_prompt => user_prompt.trim(),
                languages => languages.join(", "),
            })
            .context("render detect prompt")
    }

    /// Prompt asking the model to split a task description into subtasks.
    pub fn decomposer(
        &self,
        description: &str,
        parent: Option<&str>,
        language: &str,
        framework: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("decomposer")?;
        template
            .render(context! {
                description => description.trim(),
                parent => parent,
                language => language,
                framework => framework,
            })
            .context("render decomposer prompt")
    }

    /// Prompt asking the model to emit source code for a codable leaf.
    pub fn coder(&self, task: &Task, profile: &LanguageProfile, framework: Option<&str>) -> Result<String> {
        let details = task.implementation_details.as_ref();
        let template = self.env.get_template("coder")?;
        template
            .render(context! {
                function_name => task.function_name.as_deref(),
                parameters => serde_json::to_string(&task.parameters)?,
                return_type => task.return_type.as_deref(),
                description => task.description.trim(),
                logic => details.and_then(|d| d.logic.as_deref()),
                dependencies => details
                    .map(|d| d.dependencies.join(", "))
                    .filter(|s| !s.is_empty()),
                language => profile.name,
                framework => framework,
            })
            .context("render coder prompt")
    }

    /// Prompt asking the model for a repair plan after a failed run.
    pub fn repair(
        &self,
        stderr: &str,
        failing_file: Option<&str>,
        language: &str,
        framework: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("repair")?;
        template
            .render(context! {
                stderr => stderr.trim(),
                failing_file => failing_file,
                language => language,
                framework => framework,
            })
            .context("render repair prompt")
    }
}

//! Prompt structuring and language/framework detection.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::lang::is_supported;
use crate::core::parse::strip_code_fences;
use crate::io::gateway::{ChatRequest, ModelClient, ModelRole};
use crate::io::prompt::PromptLibrary;

/// Detected target stack for a user request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackGuess {
    pub language: String,
    pub framework: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectWire {
    language: Option<String>,
    framework: Option<String>,
}

/// Turn a raw user request into a structured development brief.
pub fn structure_prompt<C: ModelClient>(
    client: &C,
    prompts: &PromptLibrary,
    user_prompt: &str,
    language: &str,
    framework: Option<&str>,
) -> Result<String> {
    let prompt = prompts.structurer(user_prompt, language, framework)?;
    let brief = client
        .complete(&ChatRequest {
            role: ModelRole::Language,
            prompt,
            temperature: 0.3,
        })
        .context("structure user prompt")?;
    debug!(bytes = brief.len(), "structured prompt received");
    Ok(brief.trim().to_string())
}

/// Ask the model which language and framework the request implies.
///
/// Detection never fails the pipeline: unusable output falls back to
/// `fallback_language` with no framework.
pub fn detect_stack<C: ModelClient>(
    client: &C,
    prompts: &PromptLibrary,
    user_prompt: &str,
    fallback_language: &str,
) -> StackGuess {
    let fallback = StackGuess {
        language: fallback_language.to_string(),
        framework: None,
    };

    let prompt = match prompts.detect(user_prompt) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(err = %err, "detect prompt failed, using fallback language");
            return fallback;
        }
    };
    let response = match client.complete(&ChatRequest {
        role: ModelRole::Language,
        prompt,
        temperature: 0.1,
    }) {
        Ok(response) => response,
        Err(err) => {
            warn!(err = %err, "stack detection failed, using fallback language");
            return fallback;
        }
    };

    let cleaned = strip_code_fences(&response);
    let wire: DetectWire = match serde_json::from_str(&cleaned) {
        Ok(wire) => wire,
        Err(err) => {
            warn!(err = %err, "unparseable detection output, using fallback language");
            return fallback;
        }
    };

    let language = wire
        .language
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| is_supported(name));
    let Some(language) = language else {
        warn!(fallback = fallback_language, "detected language unsupported");
        return fallback;
    };

    let framework = wire
        .framework
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("null"));

    debug!(language = %language, framework = ?framework, "stack detected");
    StackGuess { language, framework }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::gateway::GatewayError;
    use crate::test_support::ScriptedClient;

    #[test]
    fn structure_prompt_trims_model_output() {
        let client = ScriptedClient::new(vec![Ok("  a structured brief \n".to_string())]);
        let prompts = PromptLibrary::new();

        let brief = structure_prompt(&client, &prompts, "build a thing", "python", None)
            .expect("structure");
        assert_eq!(brief, "a structured brief");
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn detect_parses_language_and_framework() {
        let client = ScriptedClient::new(vec![Ok(
            r#"```json
{"language": "JavaScript", "framework": "express"}
```"#
                .to_string(),
        )]);
        let prompts = PromptLibrary::new();

        let guess = detect_stack(&client, &prompts, "build an api", "python");
        assert_eq!(guess.language, "javascript");
        assert_eq!(guess.framework.as_deref(), Some("express"));
    }

    #[test]
    fn detect_falls_back_on_gateway_error() {
        let client = ScriptedClient::new(vec![Err(GatewayError::ModelUnavailable {
            attempts: 3,
            last_error: "down".to_string(),
        })]);
        let prompts = PromptLibrary::new();

        let guess = detect_stack(&client, &prompts, "build an api", "python");
        assert_eq!(guess.language, "python");
        assert_eq!(guess.framework, None);
    }

    #[test]
    fn detect_falls_back_on_unsupported_language() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"language": "brainfuck", "framework": null}"#.to_string(),
        )]);
        let prompts = PromptLibrary::new();

        let guess = detect_stack(&client, &prompts, "build an api", "python");
        assert_eq!(guess.language, "python");
    }

    #[test]
    fn detect_drops_null_framework_strings() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"language": "python", "framework": "null"}"#.to_string(),
        )]);
        let prompts = PromptLibrary::new();

        let guess = detect_stack(&client, &prompts, "script", "python");
        assert_eq!(guess.framework, None);
    }
}

//! Pipeline configuration stored in `taskforge.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::lang::is_supported;
use crate::io::gateway::{GatewayConfig, RoleModels};

pub const DEFAULT_CONFIG_PATH: &str = "taskforge.toml";

/// Pipeline configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Chat-completion endpoint base URL.
    pub base_url: String,

    /// Model identifiers per role.
    pub models: RoleModels,

    /// Directory generated files are written under.
    pub output_root: PathBuf,

    /// Checkpoint file location.
    pub state_path: PathBuf,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,

    /// Gateway attempts per request before giving up.
    pub gateway_max_attempts: u32,

    /// Pause between gateway attempts in milliseconds.
    pub gateway_backoff_ms: u64,

    /// Decomposition retries per tree level on unparseable output.
    pub decompose_max_retries: u32,

    /// Maximum depth of recursive decomposition.
    pub max_decompose_depth: u32,

    /// Repair iterations before the run loop gives up.
    pub max_repair_attempts: u32,

    /// Wall-clock budget for one project run in seconds.
    pub run_timeout_secs: u64,

    /// Truncate run stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Language assumed when detection fails.
    pub default_language: String,

    /// Framework override; `None` lets detection decide.
    pub framework: Option<String>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            models: RoleModels::default(),
            output_root: PathBuf::from("./app"),
            state_path: PathBuf::from("project_state.json"),
            request_timeout_secs: 120,
            gateway_max_attempts: 3,
            gateway_backoff_ms: 500,
            decompose_max_retries: 3,
            max_decompose_depth: 4,
            max_repair_attempts: 3,
            run_timeout_secs: 30,
            output_limit_bytes: 100_000,
            default_language: "python".to_string(),
            framework: None,
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.gateway_max_attempts == 0 {
            return Err(anyhow!("gateway_max_attempts must be > 0"));
        }
        if self.decompose_max_retries == 0 {
            return Err(anyhow!("decompose_max_retries must be > 0"));
        }
        if self.max_decompose_depth == 0 {
            return Err(anyhow!("max_decompose_depth must be > 0"));
        }
        if self.run_timeout_secs == 0 {
            return Err(anyhow!("run_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !is_supported(&self.default_language) {
            return Err(anyhow!(
                "default_language {:?} is not supported",
                self.default_language
            ));
        }
        Ok(())
    }

    /// Gateway settings derived from this config.
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            models: self.models.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_attempts: self.gateway_max_attempts,
            backoff: Duration::from_millis(self.gateway_backoff_ms),
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForgeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskforge.toml");
        let cfg = ForgeConfig {
            default_language: "javascript".to_string(),
            framework: Some("express".to_string()),
            ..ForgeConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskforge.toml");
        fs::write(&path, "max_repair_attempts = 5\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_repair_attempts, 5);
        assert_eq!(cfg.output_root, PathBuf::from("./app"));
    }

    #[test]
    fn unsupported_default_language_is_rejected() {
        let cfg = ForgeConfig {
            default_language: "cobol".to_string(),
            ..ForgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

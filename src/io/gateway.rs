//! Model gateway: chat-completion requests with credential rotation and a
//! bounded retry policy.
//!
//! The [`ModelClient`] trait decouples the pipeline from the HTTP backend;
//! tests use scripted clients that return predetermined responses without
//! touching the network.

use std::cell::Cell;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which configured model a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Reasoning,
    Language,
    Coding,
}

impl ModelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Language => "language",
            Self::Coding => "coding",
        }
    }
}

/// A single prompt destined for one model role.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub role: ModelRole,
    pub prompt: String,
    pub temperature: f32,
}

/// Gateway failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("no usable credentials: {0}")]
    Credentials(String),
    /// Terminal: the configured attempt budget is exhausted.
    #[error("model unavailable after {attempts} attempts: {last_error}")]
    ModelUnavailable { attempts: u32, last_error: String },
}

/// Abstraction over text-generation backends.
pub trait ModelClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}

/// Round-robin credential pool.
///
/// Owns the key list and rotation index outright; there is no process-global
/// credential state. Interior mutability keeps `complete` callable through a
/// shared reference in the single-threaded pipeline.
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<String>,
    index: Cell<usize>,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Result<Self, GatewayError> {
        if keys.is_empty() || keys.iter().all(|key| key.trim().is_empty()) {
            return Err(GatewayError::Credentials("empty key list".to_string()));
        }
        Ok(Self {
            keys,
            index: Cell::new(0),
        })
    }

    /// Parse a comma-separated key list from `OPENROUTER_API_KEY`.
    pub fn from_env() -> Result<Self, GatewayError> {
        let raw = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
            GatewayError::Credentials("OPENROUTER_API_KEY is not set".to_string())
        })?;
        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(keys)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The credential used for the next request.
    pub fn active(&self) -> &str {
        &self.keys[self.index.get()]
    }

    /// Rotate to the next credential (wraps modulo the list length) and
    /// return it.
    pub fn advance(&self) -> &str {
        self.index.set((self.index.get() + 1) % self.keys.len());
        self.active()
    }
}

/// Model identifiers per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleModels {
    pub reasoning: String,
    pub language: String,
    pub coding: String,
}

impl Default for RoleModels {
    fn default() -> Self {
        Self {
            reasoning: "deepseek/deepseek-r1:free".to_string(),
            language: "google/gemini-2.5-pro-exp-03-25:free".to_string(),
            coding: "open-r1/olympiccoder-32b:free".to_string(),
        }
    }
}

impl RoleModels {
    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Reasoning => &self.reasoning,
            ModelRole::Language => &self.language,
            ModelRole::Coding => &self.coding,
        }
    }
}

/// Connection settings for the OpenRouter-compatible endpoint.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub models: RoleModels,
    pub timeout: Duration,
    /// Attempts per `complete` call before `ModelUnavailable`.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            models: RoleModels::default(),
            timeout: Duration::from_secs(120),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

// Chat-completion wire types.

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: String,
}

/// Blocking HTTP gateway against a chat-completion endpoint.
pub struct OpenRouterGateway {
    http: reqwest::blocking::Client,
    pool: CredentialPool,
    config: GatewayConfig,
}

impl OpenRouterGateway {
    pub fn new(pool: CredentialPool, config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Http(err.to_string()))?;
        Ok(Self { http, pool, config })
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    fn send_once(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let model = self.config.models.model_for(request.role);
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = WireRequest {
            model,
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        debug!(model, role = request.role.as_str(), "sending chat completion");
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.pool.active())
            .header("X-Title", "taskforge")
            .json(&body)
            .send()
            .map_err(|err| GatewayError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(GatewayError::Response(format!("HTTP {status}: {text}")));
        }

        let text = response
            .text()
            .map_err(|err| GatewayError::Http(err.to_string()))?;
        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|err| GatewayError::Response(format!("malformed response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Response("missing choices".to_string()))
    }
}

impl ModelClient for OpenRouterGateway {
    fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            match self.send_once(request) {
                Ok(content) => {
                    info!(
                        role = request.role.as_str(),
                        attempt,
                        bytes = content.len(),
                        "chat completion succeeded"
                    );
                    return Ok(content);
                }
                Err(err) => {
                    warn!(
                        role = request.role.as_str(),
                        attempt,
                        max_attempts = self.config.max_attempts,
                        err = %err,
                        "chat completion failed, rotating credential"
                    );
                    last_error = err.to_string();
                    self.pool.advance();
                    if attempt < self.config.max_attempts && !self.config.backoff.is_zero() {
                        thread::sleep(self.config.backoff);
                    }
                }
            }
        }
        Err(GatewayError::ModelUnavailable {
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new((0..n).map(|i| format!("key{i}")).collect()).expect("pool")
    }

    #[test]
    fn rotation_cycles_through_all_keys_and_wraps() {
        let pool = pool(3);
        assert_eq!(pool.active(), "key0");

        let mut visited = vec![pool.active().to_string()];
        for _ in 0..3 {
            visited.push(pool.advance().to_string());
        }

        // Three failures cycle through every key; the fourth attempt is back
        // on the original credential.
        assert_eq!(visited, vec!["key0", "key1", "key2", "key0"]);
    }

    #[test]
    fn empty_key_list_is_rejected() {
        assert!(CredentialPool::new(Vec::new()).is_err());
        assert!(CredentialPool::new(vec![" ".to_string()]).is_err());
    }

    #[test]
    fn exhausted_attempts_yield_model_unavailable() {
        // Port 9 (discard) refuses connections immediately; no service runs there.
        let gateway = OpenRouterGateway::new(
            pool(2),
            GatewayConfig {
                base_url: "http://127.0.0.1:9/v1".to_string(),
                timeout: Duration::from_secs(2),
                max_attempts: 3,
                backoff: Duration::ZERO,
                ..GatewayConfig::default()
            },
        )
        .expect("gateway");

        let err = gateway
            .complete(&ChatRequest {
                role: ModelRole::Reasoning,
                prompt: "hello".to_string(),
                temperature: 0.2,
            })
            .expect_err("should fail");

        match err {
            GatewayError::ModelUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected ModelUnavailable, got {other}"),
        }
        // Three failures across a two-key pool leave the odd key active.
        assert_eq!(gateway.pool().active(), "key1");
    }

    #[test]
    fn role_models_map_each_role() {
        let models = RoleModels {
            reasoning: "r".to_string(),
            language: "l".to_string(),
            coding: "c".to_string(),
        };
        assert_eq!(models.model_for(ModelRole::Reasoning), "r");
        assert_eq!(models.model_for(ModelRole::Language), "l");
        assert_eq!(models.model_for(ModelRole::Coding), "c");
    }
}

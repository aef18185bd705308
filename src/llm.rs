//! LLM provider backends.
//!
//! Three providers are supported behind the [`LlmBackend`] trait:
//!
//! | Provider | Wire format | Default model |
//! |----------|-------------|---------------|
//! | `openai` | OpenAI chat completions | `gpt-4` |
//! | `anthropic` | Anthropic messages | `claude-3-5-sonnet-20241022` |
//! | `openrouter` | OpenAI chat completions at `openrouter.ai/api/v1` | `anthropic/claude-3.5-sonnet` |
//!
//! Backends are built only for providers whose API key is present. Asking
//! [`LlmBackends::get`] for an unconfigured provider yields
//! [`SiteError::Config`], which the server maps to `503`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use site_context_core::{SiteError, SiteResult};

use crate::config::{ApiKeys, LlmConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::OpenRouter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::OpenRouter => "openrouter",
        }
    }

    fn key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "openrouter" => Ok(Provider::OpenRouter),
            other => bail!("unknown LLM backend: '{}'", other),
        }
    }
}

/// One single-turn completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System turn, if any.
    pub system: Option<String>,
    /// User turn.
    pub user: String,
    /// Model override; the backend default is used when `None`.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text returned by a backend and the concrete model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} API returned {status}: {body}")]
    Status {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0} returned no completion text")]
    Empty(Provider),

    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: Provider, message: String },
}

impl From<LlmError> for SiteError {
    fn from(e: LlmError) -> Self {
        SiteError::Upstream(e.to_string())
    }
}

/// A chat-completion capable LLM.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn provider(&self) -> Provider;

    fn default_model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Backend for the OpenAI chat completions wire format (OpenAI, OpenRouter).
pub struct OpenAiCompatible {
    provider: Provider,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiCompatible {
    pub fn new(
        provider: Provider,
        base_url: &str,
        api_key: &str,
        default_model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            provider,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatible {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user }));

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: self.provider,
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await.map_err(|e| LlmError::Decode {
            provider: self.provider,
            message: e.to_string(),
        })?;
        let content = parse_openai_content(&json).ok_or(LlmError::Empty(self.provider))?;

        Ok(Completion { content, model })
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_content(json: &Value) -> Option<String> {
    json.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

/// Backend for the Anthropic messages API.
pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl AnthropicBackend {
    pub fn new(base_url: &str, api_key: &str, default_model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
        })
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.user }],
        });
        if let Some(system) = &request.system {
            body["system"] = Value::String(system.clone());
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: Provider::Anthropic,
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await.map_err(|e| LlmError::Decode {
            provider: Provider::Anthropic,
            message: e.to_string(),
        })?;
        let content = parse_anthropic_content(&json).ok_or(LlmError::Empty(Provider::Anthropic))?;

        Ok(Completion { content, model })
    }
}

/// Concatenate the `text` blocks of `content[]`.
fn parse_anthropic_content(json: &Value) -> Option<String> {
    let text: String = json
        .get("content")?
        .as_array()?
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Configured backends, keyed by provider.
#[derive(Clone, Default)]
pub struct LlmBackends {
    backends: HashMap<Provider, Arc<dyn LlmBackend>>,
}

impl LlmBackends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend for every provider that has an API key.
    pub fn from_config(config: &LlmConfig, keys: &ApiKeys) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut backends = Self::new();

        if let Some(key) = keys.for_provider(Provider::OpenAi) {
            backends.insert(Arc::new(OpenAiCompatible::new(
                Provider::OpenAi,
                &config.openai_base_url,
                key,
                &config.openai_model,
                timeout,
            )?));
        }
        if let Some(key) = keys.for_provider(Provider::Anthropic) {
            backends.insert(Arc::new(AnthropicBackend::new(
                &config.anthropic_base_url,
                key,
                &config.anthropic_model,
                timeout,
            )?));
        }
        if let Some(key) = keys.for_provider(Provider::OpenRouter) {
            backends.insert(Arc::new(OpenAiCompatible::new(
                Provider::OpenRouter,
                &config.openrouter_base_url,
                key,
                &config.openrouter_model,
                timeout,
            )?));
        }

        Ok(backends)
    }

    /// Register (or replace) the backend for its provider.
    pub fn insert(&mut self, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(backend.provider(), backend);
    }

    pub fn with(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.insert(backend);
        self
    }

    /// Backend for `provider`.
    ///
    /// # Errors
    ///
    /// [`SiteError::Config`] when the provider has no API key.
    pub fn get(&self, provider: Provider) -> SiteResult<Arc<dyn LlmBackend>> {
        self.backends.get(&provider).cloned().ok_or_else(|| {
            SiteError::Config(format!(
                "{} backend is not configured ({} not set)",
                provider,
                provider.key_env()
            ))
        })
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }

    pub fn configured(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.backends.contains_key(p))
            .collect()
    }
}

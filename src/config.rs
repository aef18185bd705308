//! Configuration loading and validation.
//!
//! Settings come from a TOML file (default `./config/site.toml`). Every
//! section except `[db]` is optional and falls back to the defaults below.
//! API keys are never read from the file; they come from the environment
//! via [`ApiKeys::from_env`].
//!
//! ```toml
//! [db]
//! path = "./data/site.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! environment = "production"      # or "development"
//!
//! [analysis]
//! freshness_hours = 24
//! term_count = 8
//! max_search_terms = 3
//! content_cap = 8000
//! prompt_content_chars = 2000
//! backend = "openai"              # openai | anthropic | openrouter
//!
//! [scrape]
//! timeout_secs = 15
//! browser = false
//!
//! [search]
//! results_per_query = 5
//! delay_ms = 500
//!
//! [llm]
//! timeout_secs = 60
//! temperature = 0.7
//! max_tokens = 2000
//! ```
//!
//! # Environment
//!
//! | Variable | Purpose |
//! |----------|---------|
//! | `SERPER_API_KEY` | Search API key |
//! | `OPENAI_API_KEY` | OpenAI backend |
//! | `ANTHROPIC_API_KEY` | Anthropic backend |
//! | `OPENROUTER_API_KEY` | OpenRouter backend |
//! | `SITE_FRESHNESS_HOURS` | Overrides `analysis.freshness_hours` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::llm::Provider;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL this service is reachable at, for links in CLI output.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            environment: default_environment(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_environment() -> String {
    "production".to_string()
}

impl ServerConfig {
    /// Upstream error details are only exposed in development.
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u64,
    #[serde(default = "default_term_count")]
    pub term_count: usize,
    #[serde(default = "default_max_search_terms")]
    pub max_search_terms: usize,
    #[serde(default = "default_content_cap")]
    pub content_cap: usize,
    #[serde(default = "default_prompt_content_chars")]
    pub prompt_content_chars: usize,
    #[serde(default = "default_backend")]
    pub backend: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
            term_count: default_term_count(),
            max_search_terms: default_max_search_terms(),
            content_cap: default_content_cap(),
            prompt_content_chars: default_prompt_content_chars(),
            backend: default_backend(),
        }
    }
}

fn default_freshness_hours() -> u64 {
    24
}
fn default_term_count() -> usize {
    8
}
fn default_max_search_terms() -> usize {
    3
}
fn default_content_cap() -> usize {
    8000
}
fn default_prompt_content_chars() -> usize {
    2000
}
fn default_backend() -> String {
    "openai".to_string()
}

impl AnalysisConfig {
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freshness_hours as i64)
    }

    /// Provider used for term derivation and analysis synthesis.
    pub fn provider(&self) -> Result<Provider> {
        self.backend.parse()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Use headless Chromium as the primary strategy (needs the `browser` feature).
    #[serde(default)]
    pub browser: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            user_agent: default_user_agent(),
            browser: false,
        }
    }
}

fn default_scrape_timeout() -> u64 {
    15
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; SiteContext/1.0)".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            results_per_query: default_results_per_query(),
            delay_ms: default_delay_ms(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://google.serper.dev/search".to_string()
}
fn default_results_per_query() -> usize {
    5
}
fn default_delay_ms() -> u64 {
    500
}
fn default_search_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_openrouter_base_url")]
    pub openrouter_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            openrouter_model: default_openrouter_model(),
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            openrouter_base_url: default_openrouter_base_url(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_openai_model() -> String {
    "gpt-4".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_openrouter_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

impl LlmConfig {
    /// Default model id for a provider.
    pub fn model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.openai_model,
            Provider::Anthropic => &self.anthropic_model,
            Provider::OpenRouter => &self.openrouter_model,
        }
    }
}

/// API keys read from the environment. Empty values count as unset.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub serper: Option<String>,
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub openrouter: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            serper: get("SERPER_API_KEY"),
            openai: get("OPENAI_API_KEY"),
            anthropic: get("ANTHROPIC_API_KEY"),
            openrouter: get("OPENROUTER_API_KEY"),
        }
    }

    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.openai.as_deref(),
            Provider::Anthropic => self.anthropic.as_deref(),
            Provider::OpenRouter => self.openrouter.as_deref(),
        }
    }
}

// Keys must never reach logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |k: &Option<String>| if k.is_some() { "set" } else { "unset" };
        f.debug_struct("ApiKeys")
            .field("serper", &set(&self.serper))
            .field("openai", &set(&self.openai))
            .field("anthropic", &set(&self.anthropic))
            .field("openrouter", &set(&self.openrouter))
            .finish()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;

    Ok(config)
}

/// Apply `SITE_*` environment overrides.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(raw) = lookup("SITE_FRESHNESS_HOURS") {
        config.analysis.freshness_hours = raw
            .trim()
            .parse()
            .with_context(|| format!("SITE_FRESHNESS_HOURS is not a number: '{}'", raw))?;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate analysis
    if config.analysis.freshness_hours == 0 {
        anyhow::bail!("analysis.freshness_hours must be > 0");
    }
    if config.analysis.term_count == 0 {
        anyhow::bail!("analysis.term_count must be > 0");
    }
    if config.analysis.max_search_terms == 0 {
        anyhow::bail!("analysis.max_search_terms must be > 0");
    }
    if config.analysis.content_cap < 100 {
        anyhow::bail!("analysis.content_cap must be >= 100");
    }
    config.analysis.provider().with_context(|| {
        format!(
            "Unknown analysis backend: '{}'. Must be openai, anthropic, or openrouter.",
            config.analysis.backend
        )
    })?;

    // Validate server
    match config.server.environment.as_str() {
        "production" | "development" => {}
        other => anyhow::bail!(
            "Unknown server environment: '{}'. Must be production or development.",
            other
        ),
    }

    // Validate llm
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }

    Ok(())
}

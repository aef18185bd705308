//! Error taxonomy shared by the pipeline, chat, and HTTP layers.
//!
//! | Variant | Meaning | HTTP |
//! |---------|---------|------|
//! | [`SiteError::Validation`] | Bad input, user-correctable | 400 |
//! | [`SiteError::Scrape`] | Both fetch strategies failed | written to the record |
//! | [`SiteError::Search`] | One search term failed | logged, dropped |
//! | [`SiteError::Synthesis`] | LLM analysis unusable | templated fallback |
//! | [`SiteError::NotFound`] | Unknown id | 404 |
//! | [`SiteError::State`] | Context not yet completed | 400 |
//! | [`SiteError::Upstream`] | LLM backend failed during a request | 500 |
//! | [`SiteError::Config`] | Required API key missing | 503 |
//! | [`SiteError::Store`] | Persistence failure | 500 |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("{0}")]
    Validation(String),

    #[error("website scraping failed: {0}")]
    Scrape(String),

    #[error("search failed for '{query}': {message}")]
    Search { query: String, message: String },

    #[error("analysis synthesis failed: {0}")]
    Synthesis(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SiteError {
    /// Machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SiteError::Validation(_) => "bad_request",
            SiteError::Scrape(_) => "scrape_failed",
            SiteError::Search { .. } => "search_failed",
            SiteError::Synthesis(_) => "synthesis_failed",
            SiteError::NotFound(_) => "not_found",
            SiteError::State(_) => "not_ready",
            SiteError::Upstream(_) => "upstream_error",
            SiteError::Config(_) => "service_unavailable",
            SiteError::Store(_) => "internal",
        }
    }
}

pub type SiteResult<T> = std::result::Result<T, SiteError>;

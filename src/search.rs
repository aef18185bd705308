//! Competitive search client.
//!
//! [`SerperClient`] issues one POST per query to the Serper API
//! (`https://google.serper.dev/search`) and keeps the organic hits.
//! [`collect_results`] drives a client over the derived search terms:
//!
//! - at most `max_terms` terms are searched, in term order;
//! - calls are sequential with `delay` between them;
//! - a failed term is logged and omitted, so the output is always the
//!   subsequence of terms that succeeded.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use site_context_core::models::{OrganicHit, SearchResult};
use site_context_core::SiteError;

use crate::config::SearchConfig;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search response could not be decoded: {0}")]
    Decode(String),
}

impl SearchError {
    pub fn into_site_error(self, query: &str) -> SiteError {
        SiteError::Search {
            query: query.to_string(),
            message: self.to_string(),
        }
    }
}

/// A search backend returning organic hits for one query.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, num: usize) -> Result<Vec<OrganicHit>, SearchError>;
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicHit>,
}

/// Serper.dev Google search client.
pub struct SerperClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SerperClient {
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SearchClient for SerperClient {
    async fn search(&self, query: &str, num: usize) -> Result<Vec<OrganicHit>, SearchError> {
        let body = serde_json::json!({
            "q": query,
            "num": num,
            "gl": "us",
            "hl": "en",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        let mut hits = parsed.organic;
        hits.truncate(num);
        Ok(hits)
    }
}

/// Search the first `max_terms` terms, dropping the ones that fail.
pub async fn collect_results(
    client: &dyn SearchClient,
    terms: &[String],
    max_terms: usize,
    results_per_query: usize,
    delay: Duration,
) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for (i, term) in terms.iter().take(max_terms).enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match client.search(term, results_per_query).await {
            Ok(hits) => {
                debug!(query = %term, hits = hits.len(), "search succeeded");
                results.push(SearchResult {
                    query: term.clone(),
                    organic_hits: hits,
                });
            }
            Err(e) => {
                let err = e.into_site_error(term);
                warn!(query = %term, error = %err, "search failed; term dropped");
            }
        }
    }

    results
}

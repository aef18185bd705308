//! Page fetching with a primary strategy and an automatic fallback.
//!
//! ```text
//!            ┌───────────────┐  ok   ┌─────────────────────────┐
//!   url ───▶ │    primary    │ ────▶ │ FetchedPage (primary)   │
//!            │   (browser)   │       └─────────────────────────┘
//!            └───────┬───────┘
//!                    │ error / timeout / not configured
//!                    ▼
//!            ┌───────────────┐  ok   ┌─────────────────────────┐
//!            │   fallback    │ ────▶ │ FetchedPage (fallback)  │
//!            │ (HTTP + regex)│       └─────────────────────────┘
//!            └───────┬───────┘
//!                    │ error
//!                    ▼
//!            SiteError::Scrape
//! ```
//!
//! Strategies implement [`FetchStrategy`] so tests can substitute doubles.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use site_context_core::models::{FetchMethod, FetchedPage};
use site_context_core::normalize::NormalizedUrl;
use site_context_core::{SiteError, SiteResult};

use crate::config::ScrapeConfig;
use crate::extract::{extract_with_regex, ExtractedHtml};

/// What one strategy produces for a URL.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub extracted: ExtractedHtml,
    pub raw_html_length: usize,
}

/// One way of turning a URL into extracted page data.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str) -> Result<StrategyOutput>;
}

/// Plain HTTP GET followed by regex extraction.
pub struct HttpFetcher {
    client: reqwest::Client,
    content_cap: usize,
}

impl HttpFetcher {
    pub fn new(config: &ScrapeConfig, content_cap: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            content_cap,
        })
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str) -> Result<StrategyOutput> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} from {}", status, url);
        }

        let html = response.text().await?;
        Ok(StrategyOutput {
            raw_html_length: html.len(),
            extracted: extract_with_regex(&html, self.content_cap),
        })
    }
}

/// Runs the primary strategy, then the fallback on any failure.
#[derive(Clone)]
pub struct PageFetcher {
    primary: Option<Arc<dyn FetchStrategy>>,
    fallback: Arc<dyn FetchStrategy>,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(
        primary: Option<Arc<dyn FetchStrategy>>,
        fallback: Arc<dyn FetchStrategy>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout,
        }
    }

    /// Strategies from config: the browser when enabled and compiled in,
    /// the HTTP fetcher always.
    pub fn from_config(config: &ScrapeConfig, content_cap: usize) -> Result<Self> {
        let fallback: Arc<dyn FetchStrategy> = Arc::new(HttpFetcher::new(config, content_cap)?);
        let primary = primary_from_config(config, content_cap);
        Ok(Self::new(
            primary,
            fallback,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    /// Fetch and extract `url`.
    ///
    /// # Errors
    ///
    /// [`SiteError::Scrape`] when every strategy failed.
    pub async fn fetch(&self, url: &NormalizedUrl) -> SiteResult<FetchedPage> {
        let mut primary_error = None;

        if let Some(primary) = &self.primary {
            match self.run(primary.as_ref(), &url.url).await {
                Ok(out) => return Ok(to_page(url, out, FetchMethod::Primary)),
                Err(e) => {
                    warn!(
                        url = %url.url,
                        strategy = primary.name(),
                        error = %e,
                        "primary fetch failed, falling back"
                    );
                    primary_error = Some(e.to_string());
                }
            }
        }

        match self.run(self.fallback.as_ref(), &url.url).await {
            Ok(out) => Ok(to_page(url, out, FetchMethod::Fallback)),
            Err(e) => {
                let message = match primary_error {
                    Some(p) => format!("primary: {}; fallback: {}", p, e),
                    None => e.to_string(),
                };
                Err(SiteError::Scrape(message))
            }
        }
    }

    async fn run(&self, strategy: &dyn FetchStrategy, url: &str) -> Result<StrategyOutput> {
        debug!(url, strategy = strategy.name(), "fetching page");
        match tokio::time::timeout(self.timeout, strategy.fetch(url)).await {
            Ok(result) => result,
            Err(_) => bail!(
                "{} fetch timed out after {}s",
                strategy.name(),
                self.timeout.as_secs()
            ),
        }
    }
}

fn to_page(url: &NormalizedUrl, out: StrategyOutput, method: FetchMethod) -> FetchedPage {
    FetchedPage {
        url: url.url.clone(),
        domain: url.domain.clone(),
        title: out.extracted.title,
        description: out.extracted.description,
        keywords: out.extracted.keywords,
        content: out.extracted.content,
        raw_html_length: out.raw_html_length,
        method,
    }
}

/// Fail unless a rendered navigation answered 2xx. An unknown status passes.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
pub(crate) fn ensure_success_status(url: &str, status: Option<i64>) -> Result<()> {
    match status {
        Some(code) if !(200..300).contains(&code) => bail!("HTTP {} from {}", code, url),
        _ => Ok(()),
    }
}

#[cfg(feature = "browser")]
fn primary_from_config(config: &ScrapeConfig, content_cap: usize) -> Option<Arc<dyn FetchStrategy>> {
    if config.browser {
        Some(Arc::new(crate::browser::BrowserFetcher::new(config, content_cap)))
    } else {
        None
    }
}

#[cfg(not(feature = "browser"))]
fn primary_from_config(config: &ScrapeConfig, _content_cap: usize) -> Option<Arc<dyn FetchStrategy>> {
    if config.browser {
        warn!("scrape.browser is set but this build lacks the `browser` feature; using HTTP only");
    }
    None
}

//! The website-context analysis pipeline.
//!
//! An analysis request is split in two phases so the HTTP handler can
//! answer before any network work happens:
//!
//! ```text
//!  begin(raw_url)                          run(id, url)   (background)
//!  ──────────────                          ────────────
//!  normalize ──▶ fresh completed? ─yes─▶ Cached
//!                    │ no
//!                    ▼
//!            analysis LLM configured? ─no─▶ SiteError::Config
//!                    │ yes
//!                    ▼
//!            create_processing ──▶ Started{id}
//!                                            fetch page ──▶ derive terms
//!                                                 │               │
//!                                      ScrapeError│               ▼
//!                                                 │         search terms
//!                                                 ▼               │
//!                                             fail_with           ▼
//!                                                          synthesize analysis
//!                                                                 │
//!                                                                 ▼
//!                                                           complete_with
//! ```
//!
//! Steps inside [`ContextPipeline::run`] execute strictly in order. Term
//! derivation, individual searches, and synthesis degrade to fallbacks;
//! only a total scrape failure (or a store error) fails the record.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use site_context_core::models::{
    Analysis, ContextPayload, ContextSummary, FetchedPage, SearchResult, WebsiteContext,
};
use site_context_core::normalize::{normalize_url, NormalizedUrl};
use site_context_core::store::ContextStore;
use site_context_core::{SiteError, SiteResult};

use crate::config::Config;
use crate::deriver::TermDeriver;
use crate::fetch::PageFetcher;
use crate::llm::{LlmBackends, Provider};
use crate::search::{collect_results, SearchClient};
use crate::synthesis::AnalysisSynthesizer;

/// Tunables for one pipeline instance, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub provider: Provider,
    pub freshness: chrono::Duration,
    pub term_count: usize,
    pub max_search_terms: usize,
    pub results_per_query: usize,
    pub search_delay: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            provider: config.analysis.provider()?,
            freshness: config.analysis.freshness_window(),
            term_count: config.analysis.term_count,
            max_search_terms: config.analysis.max_search_terms,
            results_per_query: config.search.results_per_query,
            search_delay: Duration::from_millis(config.search.delay_ms),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        })
    }
}

/// Result of [`ContextPipeline::begin`].
#[derive(Debug, Clone)]
pub enum AnalyzeOutcome {
    /// A fresh completed record exists; no work was started.
    Cached {
        context: WebsiteContext,
        summary: ContextSummary,
    },
    /// A `processing` record was created and must be handed to
    /// [`ContextPipeline::run`].
    Started { id: String, url: NormalizedUrl },
}

impl AnalyzeOutcome {
    pub fn context_id(&self) -> &str {
        match self {
            AnalyzeOutcome::Cached { context, .. } => &context.id,
            AnalyzeOutcome::Started { id, .. } => id,
        }
    }
}

pub struct ContextPipeline {
    store: Arc<dyn ContextStore>,
    fetcher: PageFetcher,
    search: Option<Arc<dyn SearchClient>>,
    llm: LlmBackends,
    deriver: TermDeriver,
    synthesizer: AnalysisSynthesizer,
    settings: PipelineSettings,
}

impl ContextPipeline {
    pub fn new(
        store: Arc<dyn ContextStore>,
        fetcher: PageFetcher,
        search: Option<Arc<dyn SearchClient>>,
        llm: LlmBackends,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            search,
            llm,
            deriver: TermDeriver::new(settings.term_count),
            synthesizer: AnalysisSynthesizer::new(settings.temperature, settings.max_tokens),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Fetch and extract a single page without touching the store.
    pub async fn scrape(&self, raw_url: &str) -> SiteResult<FetchedPage> {
        let url = normalize_url(raw_url)?;
        let page = self.fetcher.fetch(&url).await?;
        info!(url = %url.url, method = page.method.as_str(), bytes = page.raw_html_length, "page scraped");
        Ok(page)
    }

    /// Validate input, consult the cache, and create the `processing` record.
    ///
    /// # Errors
    ///
    /// - [`SiteError::Validation`](site_context_core::SiteError::Validation) for a missing or malformed URL.
    /// - [`SiteError::Config`](site_context_core::SiteError::Config) when the analysis backend has no key.
    pub async fn begin(&self, raw_url: &str, user_id: Option<&str>) -> SiteResult<AnalyzeOutcome> {
        let url = normalize_url(raw_url)?;

        if let Some(context) = self
            .store
            .find_fresh_completed(&url.url, self.settings.freshness)
            .await?
        {
            info!(url = %url.url, context_id = %context.id, "serving cached analysis");
            let summary = context.summary();
            return Ok(AnalyzeOutcome::Cached { context, summary });
        }

        self.llm.get(self.settings.provider)?;

        let id = self.store.create_processing(&url.url, user_id).await?;
        info!(url = %url.url, context_id = %id, "analysis started");
        Ok(AnalyzeOutcome::Started { id, url })
    }

    /// Run every step for a record created by [`begin`](Self::begin) and
    /// write the terminal state.
    ///
    /// On failure the record is moved to `failed` with the error message
    /// before the error is returned.
    pub async fn run(&self, id: &str, url: &NormalizedUrl) -> SiteResult<()> {
        let outcome = match self.execute(url).await {
            Ok(payload) => match self.store.complete_with(id, &payload).await {
                Ok(()) => Ok(payload),
                Err(e) => Err(SiteError::from(e)),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) => {
                info!(
                    context_id = %id,
                    url = %url.url,
                    terms = payload.search_terms.len(),
                    results = payload.search_results.len(),
                    "analysis completed"
                );
                Ok(())
            }
            Err(e) => {
                error!(context_id = %id, url = %url.url, error = %e, "analysis failed");
                if let Err(store_err) = self.store.fail_with(id, &e.to_string()).await {
                    error!(context_id = %id, error = %store_err, "could not record failed analysis");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, url: &NormalizedUrl) -> SiteResult<ContextPayload> {
        let llm = self.llm.get(self.settings.provider)?;

        let page = self.fetcher.fetch(url).await?;
        info!(
            url = %url.url,
            step = "fetch",
            method = page.method.as_str(),
            bytes = page.raw_html_length,
            "page fetched"
        );

        let search_terms = self.deriver.derive(llm.as_ref(), &page).await;

        let search_results = self.search_terms(url, &search_terms).await;

        let analysis = self
            .synthesizer
            .synthesize(llm.as_ref(), &page, &search_results)
            .await;

        Ok(ContextPayload {
            page,
            search_terms,
            search_results,
            analysis: Analysis::Structured(analysis),
        })
    }

    async fn search_terms(&self, url: &NormalizedUrl, terms: &[String]) -> Vec<SearchResult> {
        let Some(client) = &self.search else {
            warn!(url = %url.url, step = "search", "search API key not set, skipping competitive search");
            return Vec::new();
        };
        collect_results(
            client.as_ref(),
            terms,
            self.settings.max_search_terms,
            self.settings.results_per_query,
            self.settings.search_delay,
        )
        .await
    }
}

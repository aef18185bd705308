//! Shared test doubles and setup for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use site_context::config::Config;
use site_context::db;
use site_context::extract::ExtractedHtml;
use site_context::fetch::{FetchStrategy, PageFetcher, StrategyOutput};
use site_context::llm::{Completion, CompletionRequest, LlmBackend, LlmBackends, LlmError, Provider};
use site_context::migrate::migrate_pool;
use site_context::search::{SearchClient, SearchError};
use site_context::services::{Collaborators, Services};
use site_context::sqlite_store::SqliteContextStore;
use site_context_core::models::OrganicHit;
use site_context_core::store::ContextStore;

// ─── Fetch ──────────────────────────────────────────────────────────

pub enum FetchBehavior {
    Page(&'static str),
    Fail(&'static str),
    Panic,
}

/// Fetch strategy returning a canned page (or failing) and counting calls.
pub struct CountingFetch {
    behavior: FetchBehavior,
    pub calls: AtomicUsize,
}

impl CountingFetch {
    pub fn page(title: &'static str) -> Arc<Self> {
        Arc::new(Self {
            behavior: FetchBehavior::Page(title),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            behavior: FetchBehavior::Fail(message),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            behavior: FetchBehavior::Panic,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchStrategy for CountingFetch {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(&self, _url: &str) -> Result<StrategyOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            FetchBehavior::Page(title) => Ok(StrategyOutput {
                extracted: ExtractedHtml {
                    title: title.to_string(),
                    description: "Artisan sourdough and pastries baked daily".to_string(),
                    keywords: "bakery, bread".to_string(),
                    content: "Our bakery bakes sourdough bread every morning. Sourdough is our \
                              specialty and our croissants are famous."
                        .to_string(),
                },
                raw_html_length: 2048,
            }),
            FetchBehavior::Fail(message) => bail!("{}", message),
            FetchBehavior::Panic => panic!("renderer crashed"),
        }
    }
}

// ─── Search ─────────────────────────────────────────────────────────

/// Search client failing for the listed queries, counting every call.
pub struct ScriptedSearch {
    failing: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new(failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchClient for ScriptedSearch {
    async fn search(&self, query: &str, num: usize) -> Result<Vec<OrganicHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|f| f == query) {
            return Err(SearchError::Status {
                status: 500,
                body: "upstream down".into(),
            });
        }
        Ok((0..num.min(2))
            .map(|i| OrganicHit {
                title: format!("{} competitor {}", query, i),
                link: format!("https://competitor{}.example/{}", i, query.replace(' ', "-")),
                snippet: format!("Snippet about {}", query),
            })
            .collect())
    }
}

// ─── LLM ────────────────────────────────────────────────────────────

pub const TERMS_REPLY: &str = r#"["sourdough bakery", "artisan bread", "croissant delivery"]"#;

pub const ANALYSIS_REPLY: &str = r#"{
  "businessOverview": "Neighbourhood artisan bakery",
  "keyStrengths": ["Sourdough specialty"],
  "marketOpportunities": ["Wholesale to cafes"],
  "competitiveLandscape": "Several chains nearby",
  "recommendedFocusAreas": ["Local SEO"]
}"#;

/// LLM double that answers by recognising which prompt it was sent.
pub struct FakeLlm {
    provider: Provider,
    fail: bool,
    pub calls: AtomicUsize,
    pub last_system: std::sync::Mutex<Option<String>>,
}

impl FakeLlm {
    pub fn new(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            fail: false,
            calls: AtomicUsize::new(0),
            last_system: std::sync::Mutex::new(None),
        })
    }

    pub fn failing(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            fail: true,
            calls: AtomicUsize::new(0),
            last_system: std::sync::Mutex::new(None),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for FakeLlm {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn default_model(&self) -> &str {
        "fake-default"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = request.system.clone();
        if self.fail {
            return Err(LlmError::Status {
                provider: self.provider,
                status: 401,
                body: "invalid api key sk-secret".into(),
            });
        }

        let content = if request.user.contains("JSON array of search terms") {
            TERMS_REPLY.to_string()
        } else if request.user.contains("Respond with only a JSON object") {
            ANALYSIS_REPLY.to_string()
        } else {
            format!("Answer to: {}", request.user)
        };
        Ok(Completion {
            content,
            model: request
                .model
                .clone()
                .unwrap_or_else(|| "fake-default".to_string()),
        })
    }
}

// ─── Setup ──────────────────────────────────────────────────────────

pub fn test_config(tmp: &TempDir, port: u16) -> Config {
    let body = format!(
        r#"[db]
path = "{}/data/site.sqlite"

[server]
bind = "127.0.0.1:{}"
environment = "production"

[analysis]
term_count = 3
max_search_terms = 3

[search]
delay_ms = 0
"#,
        tmp.path().display(),
        port
    );
    toml::from_str(&body).unwrap()
}

/// Everything a test needs to drive the services and inspect the doubles.
pub struct Harness {
    pub services: Services,
    pub store: Arc<dyn ContextStore>,
    pub sqlite: SqliteContextStore,
    pub primary: Arc<CountingFetch>,
    pub fallback: Arc<CountingFetch>,
    pub search: Arc<ScriptedSearch>,
    pub llm: Arc<FakeLlm>,
}

pub async fn harness(
    config: &Config,
    primary: Arc<CountingFetch>,
    fallback: Arc<CountingFetch>,
    search: Arc<ScriptedSearch>,
    llm: Arc<FakeLlm>,
) -> Harness {
    let pool = db::connect(config).await.unwrap();
    migrate_pool(&pool).await.unwrap();

    let sqlite = SqliteContextStore::new(pool.clone());
    let store: Arc<dyn ContextStore> = Arc::new(sqlite.clone());
    let primary_dyn: Arc<dyn FetchStrategy> = primary.clone();
    let fallback_dyn: Arc<dyn FetchStrategy> = fallback.clone();
    let search_dyn: Arc<dyn SearchClient> = search.clone();
    let llm_dyn: Arc<dyn LlmBackend> = llm.clone();

    let collaborators = Collaborators {
        store: store.clone(),
        fetcher: PageFetcher::new(Some(primary_dyn), fallback_dyn, Duration::from_secs(2)),
        search: Some(search_dyn),
        llm: LlmBackends::new().with(llm_dyn),
    };
    let services = Services::new(config, pool, collaborators).unwrap();

    Harness {
        services,
        store,
        sqlite,
        primary,
        fallback,
        search,
        llm,
    }
}

pub async fn default_harness(config: &Config) -> Harness {
    harness(
        config,
        CountingFetch::page("Crumb & Co Bakery"),
        CountingFetch::page("Crumb & Co Bakery (plain)"),
        ScriptedSearch::new(&[]),
        FakeLlm::new(Provider::OpenAi),
    )
    .await
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

//! Explicitly constructed service handles.
//!
//! Every external collaborator (context store, page fetcher, search client,
//! LLM backends) is built once and passed into the components that use it.
//! [`Collaborators::from_config`] builds the production set; tests assemble
//! a [`Collaborators`] from doubles and go through the same
//! [`Services::new`].
//!
//! ```text
//!  Collaborators ──▶ ContextPipeline ──▶ AnalysisQueue
//!       │
//!       ├──────────▶ ContextChat
//!       └──────────▶ Assistant
//!  SqlitePool ─────▶ LeadStore, ConsultationStore, CaseStudyStore
//! ```

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use site_context_core::store::ContextStore;

use crate::assist::Assistant;
use crate::case_studies::CaseStudyStore;
use crate::chat::ContextChat;
use crate::config::{ApiKeys, Config};
use crate::consultations::ConsultationStore;
use crate::db;
use crate::fetch::PageFetcher;
use crate::leads::LeadStore;
use crate::llm::LlmBackends;
use crate::migrate::migrate_pool;
use crate::pipeline::{ContextPipeline, PipelineSettings};
use crate::search::{SearchClient, SerperClient};
use crate::sqlite_store::SqliteContextStore;
use crate::tasks::AnalysisQueue;

/// External collaborators consumed by the pipeline, chat, and assistant.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ContextStore>,
    pub fetcher: PageFetcher,
    pub search: Option<Arc<dyn SearchClient>>,
    pub llm: LlmBackends,
}

impl Collaborators {
    /// Production collaborators: SQLite store, HTTP/browser fetcher, Serper
    /// (when `SERPER_API_KEY` is set), and every keyed LLM provider.
    pub fn from_config(config: &Config, pool: SqlitePool, keys: &ApiKeys) -> Result<Self> {
        let search: Option<Arc<dyn SearchClient>> = match keys.serper.as_deref() {
            Some(key) => Some(Arc::new(SerperClient::new(&config.search, key)?)),
            None => {
                warn!("SERPER_API_KEY not set; analyses will run without competitive search");
                None
            }
        };

        let llm = LlmBackends::from_config(&config.llm, keys)?;
        let configured: Vec<&str> = llm.configured().iter().map(|p| p.as_str()).collect();
        info!(providers = ?configured, "LLM backends configured");

        Ok(Self {
            store: Arc::new(SqliteContextStore::new(pool)),
            fetcher: PageFetcher::from_config(&config.scrape, config.analysis.content_cap)?,
            search,
            llm,
        })
    }
}

#[derive(Clone)]
pub struct Services {
    pub queue: AnalysisQueue,
    pub chat: ContextChat,
    pub assistant: Assistant,
    pub leads: LeadStore,
    pub consultations: ConsultationStore,
    pub case_studies: CaseStudyStore,
}

impl Services {
    pub fn new(config: &Config, pool: SqlitePool, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            store,
            fetcher,
            search,
            llm,
        } = collaborators;

        let pipeline = Arc::new(ContextPipeline::new(
            store.clone(),
            fetcher,
            search.clone(),
            llm.clone(),
            PipelineSettings::from_config(config)?,
        ));

        Ok(Self {
            queue: AnalysisQueue::new(pipeline),
            chat: ContextChat::new(
                store,
                llm.clone(),
                config.llm.temperature,
                config.llm.max_tokens,
                config.analysis.prompt_content_chars,
            ),
            assistant: Assistant::new(search, llm, config.llm.temperature, config.llm.max_tokens),
            leads: LeadStore::new(pool.clone()),
            consultations: ConsultationStore::new(pool.clone()),
            case_studies: CaseStudyStore::new(pool),
        })
    }

    /// Open the database (applying the schema) and build production services.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;
        let collaborators = Collaborators::from_config(config, pool.clone(), &ApiKeys::from_env())?;
        Self::new(config, pool, collaborators)
    }

    pub fn pipeline(&self) -> &Arc<ContextPipeline> {
        self.queue.pipeline()
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        self.pipeline().store()
    }
}

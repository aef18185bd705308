mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use common::*;
use site_context::chat::ContextChat;
use site_context::fetch::{FetchStrategy, PageFetcher};
use site_context::llm::{LlmBackend, LlmBackends, Provider};
use site_context::pipeline::{AnalyzeOutcome, ContextPipeline, PipelineSettings};
use site_context::search::SearchClient;
use site_context::tasks::TaskState;
use site_context_core::models::{
    Analysis, ContextPayload, ContextStatus, FetchMethod, WebsiteContext,
};
use site_context_core::store::memory::InMemoryContextStore;
use site_context_core::store::ContextStore;
use site_context_core::normalize::normalize_url;
use site_context_core::SiteError;

async fn run_to_end(h: &Harness, url: &str) -> WebsiteContext {
    let outcome = h.services.queue.submit(url, Some("user-1")).await.unwrap();
    let AnalyzeOutcome::Started { id, .. } = outcome else {
        panic!("expected a new analysis, got {:?}", outcome);
    };
    h.services.queue.join(&id).await.unwrap();
    h.store.get(&id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_analysis_completes_with_partial_search_failures() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = harness(
        &cfg,
        CountingFetch::page("Crumb & Co Bakery"),
        CountingFetch::page("unused"),
        ScriptedSearch::new(&["artisan bread"]),
        FakeLlm::new(Provider::OpenAi),
    )
    .await;

    let ctx = run_to_end(&h, "example.com").await;

    assert_eq!(ctx.url, "https://example.com/");
    assert_eq!(ctx.domain.as_deref(), Some("example.com"));
    assert_eq!(ctx.user_id.as_deref(), Some("user-1"));
    assert_eq!(ctx.status, ContextStatus::Completed);
    assert_eq!(ctx.fetch_method, Some(FetchMethod::Primary));
    assert_eq!(ctx.title.as_deref(), Some("Crumb & Co Bakery"));
    assert_eq!(
        ctx.search_terms,
        vec!["sourdough bakery", "artisan bread", "croissant delivery"]
    );

    let queries: Vec<&str> = ctx.search_results.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(queries, vec!["sourdough bakery", "croissant delivery"]);
    assert_eq!(ctx.search_results.len(), 2);
    assert!(ctx.search_results.len() <= ctx.search_terms.len());

    let analysis = ctx.analysis.as_ref().and_then(Analysis::structured).unwrap();
    assert_eq!(analysis.business_overview, "Neighbourhood artisan bakery");
    assert!(ctx.error_message.is_none());
    assert_eq!(h.fallback.count(), 0);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = default_harness(&cfg).await;

    let first = run_to_end(&h, "example.com").await;
    let fetches = h.primary.count() + h.fallback.count();
    let searches = h.search.count();
    let llm_calls = h.llm.count();
    assert_eq!(fetches, 1);
    assert_eq!(searches, 3);
    assert_eq!(llm_calls, 2);

    // Same site, different spelling: normalizes to the same cache key.
    let outcome = h
        .services
        .queue
        .submit("  HTTPS://EXAMPLE.com ", None)
        .await
        .unwrap();
    match outcome {
        AnalyzeOutcome::Cached { context, summary } => {
            assert_eq!(context.id, first.id);
            assert_eq!(summary.pages_analyzed, 1);
            assert_eq!(summary.search_terms, 3);
            assert_eq!(summary.competitor_data, 3);
        }
        other => panic!("expected cache hit, got {:?}", other),
    }

    assert_eq!(h.primary.count() + h.fallback.count(), fetches);
    assert_eq!(h.search.count(), searches);
    assert_eq!(h.llm.count(), llm_calls);
}

#[tokio::test]
async fn test_primary_failure_falls_back() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = harness(
        &cfg,
        CountingFetch::failing("browser unavailable"),
        CountingFetch::page("Plain Fetch Bakery"),
        ScriptedSearch::new(&[]),
        FakeLlm::new(Provider::OpenAi),
    )
    .await;

    let ctx = run_to_end(&h, "https://bakery.example/menu").await;

    assert_eq!(ctx.status, ContextStatus::Completed);
    assert_eq!(ctx.fetch_method, Some(FetchMethod::Fallback));
    assert_eq!(ctx.title.as_deref(), Some("Plain Fetch Bakery"));
    assert_eq!(h.primary.count(), 1);
    assert_eq!(h.fallback.count(), 1);
}

#[tokio::test]
async fn test_total_scrape_failure_marks_failed_and_blocks_chat() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = harness(
        &cfg,
        CountingFetch::failing("browser unavailable"),
        CountingFetch::failing("HTTP 503 Service Unavailable"),
        ScriptedSearch::new(&[]),
        FakeLlm::new(Provider::OpenAi),
    )
    .await;

    let outcome = h.services.queue.submit("example.com", None).await.unwrap();
    let id = outcome.context_id().to_string();
    let state = h.services.queue.join(&id).await.unwrap();
    assert!(matches!(state, TaskState::Failed(_)));

    let ctx = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(ctx.status, ContextStatus::Failed);
    let message = ctx.error_message.unwrap();
    assert!(message.contains("HTTP 503"), "message: {}", message);
    assert!(ctx.search_terms.is_empty());
    assert_eq!(h.search.count(), 0);

    let err = h
        .services
        .chat
        .ask(&id, "How do I grow?", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SiteError::State(_)), "got {:?}", err);

    // A failed record never satisfies the cache: resubmitting starts over.
    let retry = h.services.queue.submit("example.com", None).await.unwrap();
    assert!(matches!(retry, AnalyzeOutcome::Started { .. }));
    assert_ne!(retry.context_id(), id);
}

#[tokio::test]
async fn test_panicking_task_is_recorded_as_failed() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = harness(
        &cfg,
        CountingFetch::panicking(),
        CountingFetch::page("unused"),
        ScriptedSearch::new(&[]),
        FakeLlm::new(Provider::OpenAi),
    )
    .await;

    let outcome = h.services.queue.submit("example.com", None).await.unwrap();
    let id = outcome.context_id().to_string();
    assert_eq!(h.services.queue.state(&id), Some(TaskState::Running));

    let state = h.services.queue.join(&id).await.unwrap();
    assert_eq!(state, TaskState::Failed("analysis task panicked".into()));
    // Joined runs leave no entry behind.
    assert_eq!(h.services.queue.state(&id), None);
    assert_eq!(h.services.queue.join(&id).await, None);

    let ctx = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(ctx.status, ContextStatus::Failed);
    assert_eq!(ctx.error_message.as_deref(), Some("analysis task panicked"));
}

/// Store that delegates everything except the final completion write.
struct RejectingCompletion {
    inner: Arc<InMemoryContextStore>,
}

#[async_trait]
impl ContextStore for RejectingCompletion {
    async fn find_fresh_completed(
        &self,
        url: &str,
        max_age: chrono::Duration,
    ) -> Result<Option<WebsiteContext>> {
        self.inner.find_fresh_completed(url, max_age).await
    }

    async fn create_processing(&self, url: &str, user_id: Option<&str>) -> Result<String> {
        self.inner.create_processing(url, user_id).await
    }

    async fn complete_with(&self, _id: &str, _payload: &ContextPayload) -> Result<()> {
        bail!("database is locked")
    }

    async fn fail_with(&self, id: &str, message: &str) -> Result<()> {
        self.inner.fail_with(id, message).await
    }

    async fn get(&self, id: &str) -> Result<Option<WebsiteContext>> {
        self.inner.get(id).await
    }
}

#[tokio::test]
async fn test_completion_write_failure_marks_failed() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let inner = Arc::new(InMemoryContextStore::new());
    let store: Arc<dyn ContextStore> = Arc::new(RejectingCompletion {
        inner: inner.clone(),
    });
    let primary: Arc<dyn FetchStrategy> = CountingFetch::page("Crumb & Co Bakery");
    let fallback: Arc<dyn FetchStrategy> = CountingFetch::page("unused");
    let search: Arc<dyn SearchClient> = ScriptedSearch::new(&[]);
    let llm: Arc<dyn LlmBackend> = FakeLlm::new(Provider::OpenAi);

    let pipeline = ContextPipeline::new(
        store,
        PageFetcher::new(Some(primary), fallback, Duration::from_secs(2)),
        Some(search),
        LlmBackends::new().with(llm),
        PipelineSettings::from_config(&cfg).unwrap(),
    );

    let url = normalize_url("example.com").unwrap();
    let outcome = pipeline.begin("example.com", None).await.unwrap();
    let AnalyzeOutcome::Started { id, .. } = outcome else {
        panic!("expected a new analysis, got {:?}", outcome);
    };

    let err = pipeline.run(&id, &url).await.unwrap_err();
    assert!(matches!(err, SiteError::Store(_)), "got {:?}", err);

    let ctx = inner.get(&id).await.unwrap().unwrap();
    assert_eq!(ctx.status, ContextStatus::Failed);
    assert_eq!(ctx.error_message.as_deref(), Some("database is locked"));
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_any_work() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = default_harness(&cfg).await;

    for raw in ["", "   ", "http://"] {
        let err = h.services.queue.submit(raw, None).await.unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)), "{:?} gave {:?}", raw, err);
    }
    assert_eq!(h.primary.count(), 0);
}

#[tokio::test]
async fn test_missing_analysis_backend_is_config_error() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp, 0);
    cfg.analysis.backend = "anthropic".into();
    // Only an OpenAI double is registered.
    let h = default_harness(&cfg).await;

    let err = h.services.queue.submit("example.com", None).await.unwrap_err();
    assert!(matches!(err, SiteError::Config(_)), "got {:?}", err);
    assert_eq!(h.primary.count(), 0);
}

#[tokio::test]
async fn test_chat_answers_from_completed_context() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = default_harness(&cfg).await;
    let ctx = run_to_end(&h, "example.com").await;

    let answer = h
        .services
        .chat
        .ask(&ctx.id, "Where should I advertise?", Some("openai"), Some("gpt-4o"))
        .await
        .unwrap();
    assert_eq!(answer.model, "gpt-4o");
    assert_eq!(answer.context_url, "https://example.com/");
    assert_eq!(answer.analysis_date, ctx.created_at);
    assert_eq!(answer.content, "Answer to: Where should I advertise?");

    let system = h.llm.last_system.lock().unwrap().clone().unwrap();
    assert!(system.contains("URL: https://example.com/"));
    assert!(system.contains("Neighbourhood artisan bakery"));
    assert!(system.contains("sourdough bakery"));

    // Default model label when no override is given.
    let answer = h
        .services
        .chat
        .ask(&ctx.id, "Pricing ideas?", None, None)
        .await
        .unwrap();
    assert_eq!(answer.model, "fake-default");
}

#[tokio::test]
async fn test_chat_errors() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let h = default_harness(&cfg).await;
    let ctx = run_to_end(&h, "example.com").await;
    let chat = &h.services.chat;

    let err = chat.ask("missing-id", "Hi?", None, None).await.unwrap_err();
    assert!(matches!(err, SiteError::NotFound(_)));

    let err = chat.ask(&ctx.id, "Hi?", Some("gemini"), None).await.unwrap_err();
    assert!(matches!(err, SiteError::Validation(_)));

    let err = chat.ask(&ctx.id, "   ", None, None).await.unwrap_err();
    assert!(matches!(err, SiteError::Validation(_)));

    // Anthropic is a valid backend but has no key in this harness.
    let err = chat.ask(&ctx.id, "Hi?", Some("anthropic"), None).await.unwrap_err();
    assert!(matches!(err, SiteError::Config(_)));
}

#[tokio::test]
async fn test_chat_upstream_failure() {
    let store = Arc::new(InMemoryContextStore::new());
    let mut ctx = WebsiteContext::processing("https://example.com/", None);
    ctx.status = ContextStatus::Completed;
    store.insert(ctx.clone()).unwrap();

    let llm = LlmBackends::new().with(FakeLlm::failing(Provider::OpenRouter));
    let chat = ContextChat::new(store, llm, 0.7, 2000, 2000);

    let err = chat
        .ask(&ctx.id, "Hi?", Some("openrouter"), None)
        .await
        .unwrap_err();
    match err {
        SiteError::Upstream(msg) => assert!(msg.contains("401")),
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_rejects_every_non_completed_status() {
    let store = Arc::new(InMemoryContextStore::new());
    let llm = LlmBackends::new().with(FakeLlm::new(Provider::OpenAi));
    let chat = ContextChat::new(store.clone(), llm, 0.7, 2000, 2000);

    for status in ContextStatus::ALL {
        let mut ctx = WebsiteContext::processing("https://example.com/", None);
        ctx.status = status;
        store.insert(ctx.clone()).unwrap();

        let result = chat.ask(&ctx.id, "Hi?", None, None).await;
        if status == ContextStatus::Completed {
            assert!(result.is_ok(), "completed context should answer");
        } else {
            assert!(
                matches!(result, Err(SiteError::State(_))),
                "{} should be rejected",
                status
            );
        }
    }
}

//! Context-grounded chat.
//!
//! A question is answered against one stored, completed
//! [`WebsiteContext`]: the record is rendered into a grounding prompt
//! (system turn) and the question is sent as the user turn to the selected
//! backend. The chat never modifies the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use site_context_core::models::{ContextStatus, WebsiteContext};
use site_context_core::prompt::grounding_prompt;
use site_context_core::store::ContextStore;
use site_context_core::{SiteError, SiteResult};

use crate::llm::{CompletionRequest, LlmBackends, Provider};

/// Backend used when a chat request names none.
pub const DEFAULT_CHAT_BACKEND: &str = "openai";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub content: String,
    /// Concrete model id that produced the answer.
    pub model: String,
    pub context_url: String,
    pub analysis_date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ContextChat {
    store: Arc<dyn ContextStore>,
    llm: LlmBackends,
    temperature: f32,
    max_tokens: u32,
    content_chars: usize,
}

impl ContextChat {
    pub fn new(
        store: Arc<dyn ContextStore>,
        llm: LlmBackends,
        temperature: f32,
        max_tokens: u32,
        content_chars: usize,
    ) -> Self {
        Self {
            store,
            llm,
            temperature,
            max_tokens,
            content_chars,
        }
    }

    /// Answer `question` about context `id`.
    ///
    /// `backend` selects the provider (`openai`, `anthropic`, `openrouter`;
    /// default `openai`), `model_name` overrides its default model.
    ///
    /// # Errors
    ///
    /// | Error | When |
    /// |-------|------|
    /// | `Validation` | empty question or unknown backend |
    /// | `NotFound` | no record with `id` |
    /// | `State` | record is not `completed` |
    /// | `Config` | backend has no API key |
    /// | `Upstream` | backend call failed |
    pub async fn ask(
        &self,
        id: &str,
        question: &str,
        backend: Option<&str>,
        model_name: Option<&str>,
    ) -> SiteResult<ChatAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SiteError::Validation("Question is required".into()));
        }

        let provider: Provider = backend
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_CHAT_BACKEND)
            .parse()
            .map_err(|e: anyhow::Error| SiteError::Validation(e.to_string()))?;

        let context = self.completed_context(id).await?;
        let llm = self.llm.get(provider)?;

        let request = CompletionRequest {
            system: Some(grounding_prompt(&context, self.content_chars)),
            user: question.to_string(),
            model: model_name
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let completion = llm.complete(&request).await.map_err(|e| {
            warn!(context_id = %id, provider = %provider, error = %e, "chat backend failed");
            SiteError::from(e)
        })?;

        info!(context_id = %id, model = %completion.model, "chat answered");
        Ok(ChatAnswer {
            content: completion.content,
            model: completion.model,
            context_url: context.url,
            analysis_date: context.created_at,
        })
    }

    async fn completed_context(&self, id: &str) -> SiteResult<WebsiteContext> {
        let context = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SiteError::NotFound("Context not found".into()))?;

        if context.status != ContextStatus::Completed {
            return Err(SiteError::State("Context analysis not completed".into()));
        }
        Ok(context)
    }
}

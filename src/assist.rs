//! Quick assistant endpoints that need no stored context.
//!
//! - **Quick chat** searches the question, grounds a short completion in
//!   the top snippets, and answers in a few sentences.
//! - **Marketing content** forwards a copywriting request about a URL.
//!
//! Both run on the OpenAI backend. Quick chat additionally needs the search
//! API key; either missing key is a [`SiteError::Config`].

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use site_context_core::prompt::{
    marketing_content_prompt, quick_chat_prompt, MARKETING_CONTENT_SYSTEM, QUICK_CHAT_SYSTEM,
};
use site_context_core::{SiteError, SiteResult};

use crate::llm::{CompletionRequest, LlmBackends, Provider};
use crate::search::SearchClient;

const QUICK_CHAT_MODEL: &str = "gpt-3.5-turbo";
const QUICK_CHAT_MAX_TOKENS: u32 = 300;
const QUICK_CHAT_RESULTS: usize = 5;
const QUICK_CHAT_SNIPPETS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub content: String,
}

#[derive(Clone)]
pub struct Assistant {
    search: Option<Arc<dyn SearchClient>>,
    llm: LlmBackends,
    temperature: f32,
    max_tokens: u32,
}

impl Assistant {
    pub fn new(
        search: Option<Arc<dyn SearchClient>>,
        llm: LlmBackends,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            search,
            llm,
            temperature,
            max_tokens,
        }
    }

    pub async fn quick_chat(&self, question: &str) -> SiteResult<AssistantReply> {
        let (Some(search), true) = (&self.search, self.llm.is_configured(Provider::OpenAi)) else {
            return Err(SiteError::Config("Service configuration error".into()));
        };

        let question = question.trim();
        if question.is_empty() {
            return Err(SiteError::Validation("Question is required".into()));
        }

        let snippets: Vec<String> = match search.search(question, QUICK_CHAT_RESULTS).await {
            Ok(hits) => hits
                .into_iter()
                .map(|h| h.snippet)
                .filter(|s| !s.trim().is_empty())
                .take(QUICK_CHAT_SNIPPETS)
                .collect(),
            Err(e) => {
                warn!(error = %e, "quick chat search failed, answering without snippets");
                Vec::new()
            }
        };

        let llm = self.llm.get(Provider::OpenAi)?;
        let completion = llm
            .complete(&CompletionRequest {
                system: Some(QUICK_CHAT_SYSTEM.to_string()),
                user: quick_chat_prompt(question, &snippets),
                model: Some(QUICK_CHAT_MODEL.to_string()),
                temperature: self.temperature,
                max_tokens: QUICK_CHAT_MAX_TOKENS,
            })
            .await?;

        Ok(AssistantReply {
            content: completion.content.trim().to_string(),
        })
    }

    pub async fn marketing_content(&self, url: &str, request: &str) -> SiteResult<AssistantReply> {
        let (url, request) = (url.trim(), request.trim());
        if url.is_empty() || request.is_empty() {
            return Err(SiteError::Validation("URL and prompt are required".into()));
        }

        let llm = self.llm.get(Provider::OpenAi)?;
        let completion = llm
            .complete(&CompletionRequest {
                system: Some(MARKETING_CONTENT_SYSTEM.to_string()),
                user: marketing_content_prompt(url, request),
                model: None,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            })
            .await?;

        Ok(AssistantReply {
            content: completion.content,
        })
    }
}

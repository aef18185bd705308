//! Search-term derivation against a live LLM.
//!
//! The model is asked for a JSON array via
//! [`site_context_core::prompt::term_prompt`]. A failed call or a reply that
//! does not parse as a list of strings falls back to the deterministic
//! frequency method in [`site_context_core::terms::derive_terms`].

use tracing::{debug, warn};

use site_context_core::models::FetchedPage;
use site_context_core::prompt::term_prompt;
use site_context_core::terms::{derive_terms, parse_llm_terms};

use crate::llm::{CompletionRequest, LlmBackend};

const TERM_TEMPERATURE: f32 = 0.3;
const TERM_MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone)]
pub struct TermDeriver {
    target: usize,
}

impl TermDeriver {
    pub fn new(target: usize) -> Self {
        Self { target }
    }

    /// Up to `target` distinct terms for `page`. Never fails.
    pub async fn derive(&self, llm: &dyn LlmBackend, page: &FetchedPage) -> Vec<String> {
        let request = CompletionRequest {
            system: None,
            user: term_prompt(page, self.target),
            model: None,
            temperature: TERM_TEMPERATURE,
            max_tokens: TERM_MAX_TOKENS,
        };

        match llm.complete(&request).await {
            Ok(completion) => match parse_llm_terms(&completion.content, self.target) {
                Some(terms) => {
                    debug!(url = %page.url, count = terms.len(), "terms derived by LLM");
                    return terms;
                }
                None => {
                    warn!(url = %page.url, step = "terms", "LLM terms did not parse, using frequency fallback");
                }
            },
            Err(e) => {
                warn!(url = %page.url, step = "terms", error = %e, "LLM term request failed, using frequency fallback");
            }
        }

        derive_terms(page, self.target)
    }
}

//! Marketing analysis synthesis.
//!
//! The synthesizer always produces a structured [`MarketingAnalysis`]. A
//! failed LLM call or an unparseable reply is downgraded to a
//! [`SiteError::Synthesis`] warning and replaced by
//! [`templated_analysis`], so synthesis never fails a pipeline run.

use tracing::{debug, warn};

use site_context_core::analysis::{parse_analysis, templated_analysis};
use site_context_core::models::{FetchedPage, MarketingAnalysis, SearchResult};
use site_context_core::prompt::analysis_prompt;
use site_context_core::{SiteError, SiteResult};

use crate::llm::{CompletionRequest, LlmBackend};

#[derive(Debug, Clone)]
pub struct AnalysisSynthesizer {
    temperature: f32,
    max_tokens: u32,
}

impl AnalysisSynthesizer {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    pub async fn synthesize(
        &self,
        llm: &dyn LlmBackend,
        page: &FetchedPage,
        results: &[SearchResult],
    ) -> MarketingAnalysis {
        match self.ask(llm, page, results).await {
            Ok(analysis) => {
                debug!(url = %page.url, "analysis synthesized by LLM");
                analysis
            }
            Err(e) => {
                warn!(url = %page.url, step = "synthesis", error = %e, "using templated analysis");
                templated_analysis(page, results)
            }
        }
    }

    async fn ask(
        &self,
        llm: &dyn LlmBackend,
        page: &FetchedPage,
        results: &[SearchResult],
    ) -> SiteResult<MarketingAnalysis> {
        let request = CompletionRequest {
            system: None,
            user: analysis_prompt(page, results),
            model: None,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let completion = llm
            .complete(&request)
            .await
            .map_err(|e| SiteError::Synthesis(e.to_string()))?;

        parse_analysis(&completion.content)
            .ok_or_else(|| SiteError::Synthesis("reply is not a structured analysis".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, LlmError, Provider};
    use async_trait::async_trait;
    use site_context_core::models::{FetchMethod, OrganicHit};

    struct Reply(&'static str);

    #[async_trait]
    impl LlmBackend for Reply {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
            Ok(Completion {
                content: self.0.to_string(),
                model: "test-model".into(),
            })
        }
    }

    fn page() -> FetchedPage {
        FetchedPage {
            url: "https://acme.example/".into(),
            domain: "acme.example".into(),
            title: "Acme Roofing".into(),
            description: String::new(),
            keywords: String::new(),
            content: "We fix roofs.".into(),
            raw_html_length: 10,
            method: FetchMethod::Primary,
        }
    }

    fn results() -> Vec<SearchResult> {
        vec![SearchResult {
            query: "roof repair".into(),
            organic_hits: vec![OrganicHit::default(), OrganicHit::default()],
        }]
    }

    #[tokio::test]
    async fn test_structured_reply_is_parsed() {
        let reply = r#"```json
{"businessOverview": "Regional roofer", "keyStrengths": ["Fast"], "competitiveLandscape": "Crowded"}
```"#;
        let analysis = AnalysisSynthesizer::new(0.7, 2000)
            .synthesize(&Reply(reply), &page(), &results())
            .await;
        assert_eq!(analysis.business_overview, "Regional roofer");
        assert_eq!(analysis.key_strengths, vec!["Fast".to_string()]);
    }

    #[tokio::test]
    async fn test_prose_reply_uses_template() {
        let analysis = AnalysisSynthesizer::new(0.7, 2000)
            .synthesize(&Reply("Acme is a strong brand."), &page(), &results())
            .await;
        assert_eq!(analysis.business_overview, "Website analysis for Acme Roofing");
        assert_eq!(
            analysis.competitive_landscape,
            "Found 2 search results across 1 queries"
        );
    }
}

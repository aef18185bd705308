//! Core data models used throughout Site Context.
//!
//! A [`WebsiteContext`] is the persisted unit of analysis. It is created in
//! the `processing` state before any network work starts and later moves to
//! exactly one terminal state:
//!
//! ```text
//!               complete_with()
//!  processing ─────────────────▶ completed
//!       │
//!       └──────────────────────▶ failed
//!               fail_with()
//! ```
//!
//! All models serialize to camelCase JSON, which is the shape served by the
//! HTTP API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SiteError;

/// Lifecycle state of a [`WebsiteContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    Processing,
    Completed,
    Failed,
}

impl ContextStatus {
    pub const ALL: [ContextStatus; 3] = [
        ContextStatus::Processing,
        ContextStatus::Completed,
        ContextStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextStatus::Processing => "processing",
            ContextStatus::Completed => "completed",
            ContextStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContextStatus::Processing)
    }
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextStatus {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ContextStatus::Processing),
            "completed" => Ok(ContextStatus::Completed),
            "failed" => Ok(ContextStatus::Failed),
            other => Err(SiteError::Validation(format!(
                "unknown context status: {}",
                other
            ))),
        }
    }
}

/// Which fetch strategy produced a [`FetchedPage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Primary,
    Fallback,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Primary => "primary",
            FetchMethod::Fallback => "fallback",
        }
    }
}

impl FromStr for FetchMethod {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(FetchMethod::Primary),
            "fallback" => Ok(FetchMethod::Fallback),
            other => Err(SiteError::Validation(format!(
                "unknown fetch method: {}",
                other
            ))),
        }
    }
}

/// Attributes extracted from one fetched web page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedPage {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub description: String,
    pub keywords: String,
    /// Visible text, capped with a trailing `...` marker when truncated.
    pub content: String,
    pub raw_html_length: usize,
    pub method: FetchMethod,
}

/// One non-paid search-engine result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganicHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// Organic hits collected for one search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub query: String,
    #[serde(default)]
    pub organic_hits: Vec<OrganicHit>,
}

/// Structured marketing analysis, the shape the pipeline always writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketingAnalysis {
    pub business_overview: String,
    pub key_strengths: Vec<String>,
    pub market_opportunities: Vec<String>,
    pub competitive_landscape: String,
    pub recommended_focus_areas: Vec<String>,
}

/// Stored analysis. Rows written by this crate are always `Structured`;
/// `Text` keeps readers tolerant of free-text analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis {
    Structured(MarketingAnalysis),
    Text(String),
}

impl Analysis {
    pub fn structured(&self) -> Option<&MarketingAnalysis> {
        match self {
            Analysis::Structured(a) => Some(a),
            Analysis::Text(_) => None,
        }
    }
}

/// Everything written by `complete_with` when a pipeline run succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPayload {
    pub page: FetchedPage,
    pub search_terms: Vec<String>,
    pub search_results: Vec<SearchResult>,
    pub analysis: Analysis,
}

/// A persisted analysis of one website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteContext {
    pub id: String,
    pub url: String,
    pub user_id: Option<String>,
    pub status: ContextStatus,
    pub domain: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub keywords: Option<String>,
    pub fetch_method: Option<FetchMethod>,
    pub raw_html_length: Option<i64>,
    pub search_terms: Vec<String>,
    pub search_results: Vec<SearchResult>,
    pub analysis: Option<Analysis>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebsiteContext {
    /// A fresh `processing` record with a new UUID.
    pub fn processing(url: &str, user_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            user_id: user_id.map(str::to_string),
            status: ContextStatus::Processing,
            domain: None,
            title: None,
            description: None,
            content: None,
            keywords: None,
            fetch_method: None,
            raw_html_length: None,
            search_terms: Vec::new(),
            search_results: Vec::new(),
            analysis: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a successful payload and move to `completed`.
    pub fn apply_payload(&mut self, payload: &ContextPayload, now: DateTime<Utc>) {
        self.status = ContextStatus::Completed;
        self.domain = Some(payload.page.domain.clone());
        self.title = Some(payload.page.title.clone());
        self.description = Some(payload.page.description.clone());
        self.content = Some(payload.page.content.clone());
        self.keywords = Some(payload.page.keywords.clone());
        self.fetch_method = Some(payload.page.method);
        self.raw_html_length = Some(payload.page.raw_html_length as i64);
        self.search_terms = payload.search_terms.clone();
        self.search_results = payload.search_results.clone();
        self.analysis = Some(payload.analysis.clone());
        self.updated_at = now;
    }

    /// Counts reported to clients on a cache hit.
    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            pages_analyzed: 1,
            search_terms: self.search_terms.len(),
            competitor_data: self.search_results.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub pages_analyzed: usize,
    pub search_terms: usize,
    pub competitor_data: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in ContextStatus::ALL {
            assert_eq!(status.as_str().parse::<ContextStatus>().unwrap(), status);
        }
        assert!("done".parse::<ContextStatus>().is_err());
    }

    #[test]
    fn test_only_processing_is_non_terminal() {
        assert!(!ContextStatus::Processing.is_terminal());
        assert!(ContextStatus::Completed.is_terminal());
        assert!(ContextStatus::Failed.is_terminal());
    }

    #[test]
    fn test_analysis_accepts_free_text() {
        let parsed: Analysis = serde_json::from_str("\"Strong brand, weak SEO.\"").unwrap();
        assert_eq!(parsed, Analysis::Text("Strong brand, weak SEO.".into()));
        assert!(parsed.structured().is_none());
    }

    #[test]
    fn test_analysis_accepts_structured_object() {
        let parsed: Analysis = serde_json::from_str(
            r#"{"businessOverview": "Bakery", "keyStrengths": ["Local"]}"#,
        )
        .unwrap();
        let structured = parsed.structured().unwrap();
        assert_eq!(structured.business_overview, "Bakery");
        assert_eq!(structured.key_strengths, vec!["Local".to_string()]);
        assert!(structured.market_opportunities.is_empty());
    }

    #[test]
    fn test_context_serializes_camel_case() {
        let ctx = WebsiteContext::processing("https://example.com/", Some("u1"));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["userId"], "u1");
        assert!(json.get("searchTerms").is_some());
        assert!(json.get("errorMessage").is_some());
    }

    #[test]
    fn test_summary_counts() {
        let mut ctx = WebsiteContext::processing("https://example.com/", None);
        ctx.search_terms = vec!["a".into(), "b".into(), "c".into()];
        ctx.search_results = vec![SearchResult {
            query: "a".into(),
            organic_hits: vec![],
        }];
        let summary = ctx.summary();
        assert_eq!(summary.pages_analyzed, 1);
        assert_eq!(summary.search_terms, 3);
        assert_eq!(summary.competitor_data, 1);
    }
}

//! Parsing of LLM analysis replies and the deterministic templated fallback.

use serde_json::Value;

use crate::models::{FetchedPage, MarketingAnalysis, SearchResult};
use crate::prompt::strip_code_fence;

/// Parse an LLM reply into a [`MarketingAnalysis`].
///
/// Accepts camelCase keys (the requested shape) and snake_case keys (what
/// models frequently return anyway). Returns `None` for anything that is not
/// a JSON object with a non-empty business overview.
pub fn parse_analysis(raw: &str) -> Option<MarketingAnalysis> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let obj = value.as_object()?;

    let text = |camel: &str, snake: &str| -> String {
        obj.get(camel)
            .or_else(|| obj.get(snake))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    let list = |camel: &str, snake: &str| -> Vec<String> {
        obj.get(camel)
            .or_else(|| obj.get(snake))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let analysis = MarketingAnalysis {
        business_overview: text("businessOverview", "business_overview"),
        key_strengths: list("keyStrengths", "key_strengths"),
        market_opportunities: list("marketOpportunities", "market_opportunities"),
        competitive_landscape: text("competitiveLandscape", "competitive_landscape"),
        recommended_focus_areas: list("recommendedFocusAreas", "recommended_focus_areas"),
    };

    if analysis.business_overview.is_empty() {
        None
    } else {
        Some(analysis)
    }
}

/// Analysis derived from counts alone, used when the LLM reply is unusable.
pub fn templated_analysis(page: &FetchedPage, results: &[SearchResult]) -> MarketingAnalysis {
    let title = if page.title.trim().is_empty() {
        page.domain.as_str()
    } else {
        page.title.trim()
    };
    let hits: usize = results.iter().map(|r| r.organic_hits.len()).sum();

    let mut strengths = Vec::new();
    if !page.description.trim().is_empty() {
        strengths.push(page.description.trim().to_string());
    }

    MarketingAnalysis {
        business_overview: format!("Website analysis for {}", title),
        key_strengths: strengths,
        market_opportunities: results
            .iter()
            .map(|r| format!("Explore positioning for \"{}\"", r.query))
            .collect(),
        competitive_landscape: format!(
            "Found {} search results across {} queries",
            hits,
            results.len()
        ),
        recommended_focus_areas: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchMethod, OrganicHit};

    fn page() -> FetchedPage {
        FetchedPage {
            url: "https://acme.io/".into(),
            domain: "acme.io".into(),
            title: "Acme Analytics".into(),
            description: "Dashboards for small teams".into(),
            keywords: String::new(),
            content: String::new(),
            raw_html_length: 0,
            method: FetchMethod::Fallback,
        }
    }

    #[test]
    fn test_parse_camel_case() {
        let raw = r#"{"businessOverview": "Analytics SaaS", "keyStrengths": ["Fast", ""],
            "marketOpportunities": ["EU"], "competitiveLandscape": "Crowded",
            "recommendedFocusAreas": ["SEO"]}"#;
        let a = parse_analysis(raw).unwrap();
        assert_eq!(a.business_overview, "Analytics SaaS");
        assert_eq!(a.key_strengths, vec!["Fast".to_string()]);
        assert_eq!(a.recommended_focus_areas, vec!["SEO".to_string()]);
    }

    #[test]
    fn test_parse_snake_case_in_fence() {
        let raw = "```json\n{\"business_overview\": \"Bakery\", \"key_strengths\": [\"Local\"]}\n```";
        let a = parse_analysis(raw).unwrap();
        assert_eq!(a.business_overview, "Bakery");
        assert_eq!(a.key_strengths, vec!["Local".to_string()]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_analysis("Here is my analysis: great site!").is_none());
        assert!(parse_analysis("[\"a\"]").is_none());
        assert!(parse_analysis(r#"{"keyStrengths": ["x"]}"#).is_none());
    }

    #[test]
    fn test_templated_counts() {
        let results = vec![
            SearchResult {
                query: "analytics".into(),
                organic_hits: vec![OrganicHit::default(), OrganicHit::default()],
            },
            SearchResult {
                query: "dashboards".into(),
                organic_hits: vec![OrganicHit::default()],
            },
        ];
        let a = templated_analysis(&page(), &results);
        assert_eq!(a.business_overview, "Website analysis for Acme Analytics");
        assert_eq!(a.competitive_landscape, "Found 3 search results across 2 queries");
        assert_eq!(a.market_opportunities.len(), 2);
    }

    #[test]
    fn test_templated_falls_back_to_domain() {
        let mut p = page();
        p.title = "  ".into();
        let a = templated_analysis(&p, &[]);
        assert_eq!(a.business_overview, "Website analysis for acme.io");
        assert_eq!(a.competitive_landscape, "Found 0 search results across 0 queries");
    }
}

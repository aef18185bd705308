//! Prompt builders for every LLM call the service makes.
//!
//! All builders are pure functions over stored data so that the exact text
//! sent upstream can be asserted in tests without a network.
//!
//! | Builder | Used by | Expected reply |
//! |---------|---------|----------------|
//! | [`term_prompt`] | term deriver | JSON array of strings |
//! | [`analysis_prompt`] | analysis synthesizer | JSON object ([`MarketingAnalysis`]) |
//! | [`grounding_prompt`] | context-grounded chat | free text |
//! | [`quick_chat_prompt`] | quick chat | free text |
//! | [`marketing_content_prompt`] | marketing content | free text |

use std::fmt::Write as _;

use crate::models::{Analysis, FetchedPage, MarketingAnalysis, SearchResult, WebsiteContext};
use crate::text::truncate_chars;

/// Page content characters embedded in term and analysis prompts.
const PAGE_EXCERPT_CHARS: usize = 2000;

/// Search terms listed in the grounding prompt.
const GROUNDING_TERMS: usize = 8;
/// Search results (and hits per result) listed in the grounding prompt.
const GROUNDING_RESULTS: usize = 3;
const GROUNDING_HITS: usize = 3;

/// System turn for quick chat.
pub const QUICK_CHAT_SYSTEM: &str = "You are a helpful marketing assistant.";

/// System turn for marketing content generation.
pub const MARKETING_CONTENT_SYSTEM: &str = "You are an expert marketing AI assistant. \
Analyze the provided URL and create marketing content based on the user's prompt. \
Focus on compelling, conversion-focused content.";

/// Remove a surrounding Markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Ask for `count` search terms as a bare JSON array.
pub fn term_prompt(page: &FetchedPage, count: usize) -> String {
    format!(
        "Based on this website content from {domain}, generate up to {count} relevant search \
terms that would help find competitors and market insights. Focus on the main \
business and industry keywords.\n\n\
Title: {title}\n\
Description: {description}\n\
Keywords: {keywords}\n\
Website content: {content}\n\n\
Return only a JSON array of search terms, like: [\"term1\", \"term2\", \"term3\"]",
        domain = page.domain,
        count = count,
        title = page.title,
        description = page.description,
        keywords = page.keywords,
        content = truncate_chars(&page.content, PAGE_EXCERPT_CHARS),
    )
}

/// Ask for a [`MarketingAnalysis`] as a bare JSON object.
pub fn analysis_prompt(page: &FetchedPage, results: &[SearchResult]) -> String {
    let competitors = if results.is_empty() {
        "No competitor data available".to_string()
    } else {
        results
            .iter()
            .map(|r| format!("Search: \"{}\"\nTop Results: {}", r.query, top_hits(r)))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "As a marketing expert, analyze this website and its competitors.\n\n\
WEBSITE ANALYSIS:\n\
Domain: {domain}\n\
Title: {title}\n\
Description: {description}\n\
Content: {content}\n\n\
COMPETITOR RESEARCH:\n{competitors}\n\n\
Respond with only a JSON object with these keys:\n\
\"businessOverview\" (string), \"keyStrengths\" (array of strings), \
\"marketOpportunities\" (array of strings), \"competitiveLandscape\" (string), \
\"recommendedFocusAreas\" (array of strings).",
        domain = page.domain,
        title = page.title,
        description = page.description,
        content = truncate_chars(&page.content, PAGE_EXCERPT_CHARS),
        competitors = competitors,
    )
}

/// System turn for chat, assembled from a stored context.
///
/// Embeds the URL, title, description, the first `content_chars` characters
/// of content, up to 8 search terms, the first 3 search results with their
/// top 3 hits, and the structured analysis fields when present.
pub fn grounding_prompt(ctx: &WebsiteContext, content_chars: usize) -> String {
    let analysis: Option<&MarketingAnalysis> = ctx.analysis.as_ref().and_then(|a| a.structured());
    let free_text = ctx.analysis.as_ref().and_then(|a| match a {
        Analysis::Text(t) => Some(t.as_str()),
        Analysis::Structured(_) => None,
    });

    let mut out = String::new();
    out.push_str(
        "You are an expert marketing AI assistant with comprehensive knowledge of the \
following website and its competitive landscape:\n\n",
    );

    out.push_str("WEBSITE ANALYSIS:\n");
    let _ = writeln!(out, "URL: {}", ctx.url);
    let _ = writeln!(out, "Title: {}", non_empty(ctx.title.as_deref(), "Unknown"));
    let _ = writeln!(
        out,
        "Description: {}",
        non_empty(ctx.description.as_deref(), "No description")
    );

    out.push_str("\nBUSINESS OVERVIEW:\n");
    let overview = analysis
        .map(|a| a.business_overview.as_str())
        .or(free_text)
        .unwrap_or("");
    let _ = writeln!(out, "{}", non_empty(Some(overview), "Not available"));

    let _ = writeln!(out, "\nWEBSITE CONTENT (first {} characters):", content_chars);
    let content = ctx
        .content
        .as_deref()
        .map(|c| truncate_chars(c, content_chars));
    let _ = writeln!(out, "{}", non_empty(content, "Content unavailable"));

    if let Some(a) = analysis {
        push_bullets(&mut out, "KEY STRENGTHS", &a.key_strengths);
        push_bullets(&mut out, "MARKET OPPORTUNITIES", &a.market_opportunities);
        out.push_str("\nCOMPETITIVE LANDSCAPE:\n");
        let _ = writeln!(
            out,
            "{}",
            non_empty(Some(&a.competitive_landscape), "Not available")
        );
    }

    out.push_str("\nSEARCH TERMS FOR MARKET RESEARCH:\n");
    let terms: Vec<&str> = ctx
        .search_terms
        .iter()
        .take(GROUNDING_TERMS)
        .map(String::as_str)
        .collect();
    let _ = writeln!(out, "{}", terms.join(", "));

    out.push_str("\nCOMPETITIVE DATA:\n");
    if ctx.search_results.is_empty() {
        out.push_str("No competitive data available\n");
    }
    for result in ctx.search_results.iter().take(GROUNDING_RESULTS) {
        let _ = writeln!(out, "Query: {}", result.query);
        if result.organic_hits.is_empty() {
            out.push_str("Top Results: No results\n");
        }
        for hit in result.organic_hits.iter().take(GROUNDING_HITS) {
            let _ = writeln!(out, "- {} ({}): {}", hit.title, hit.link, hit.snippet);
        }
    }

    if let Some(a) = analysis {
        push_bullets(&mut out, "RECOMMENDED FOCUS AREAS", &a.recommended_focus_areas);
    }

    out.push_str(
        "\nBased on this analysis, provide detailed, actionable marketing insights. Use \
specific data points from the analysis to support your recommendations.",
    );
    out
}

/// User turn for quick chat: the question grounded in search snippets.
pub fn quick_chat_prompt(question: &str, snippets: &[String]) -> String {
    let snippets_text = if snippets.is_empty() {
        "No search snippets available".to_string()
    } else {
        snippets
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You are a senior marketing strategist. Use the following search snippets to inform \
your answer.\n\nSearch snippets:\n{}\n\nQuestion: {}\n\n\
Provide a concise (4-6 sentence) marketing-focused answer.",
        snippets_text, question
    )
}

/// User turn for marketing content generation.
pub fn marketing_content_prompt(url: &str, request: &str) -> String {
    format!(
        "URL: {}\n\nUser Request: {}\n\nPlease provide detailed marketing content and recommendations.",
        url, request
    )
}

fn top_hits(result: &SearchResult) -> String {
    if result.organic_hits.is_empty() {
        return "No results".to_string();
    }
    result
        .organic_hits
        .iter()
        .take(GROUNDING_HITS)
        .map(|h| format!("{} ({})", h.title, h.link))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_bullets(out: &mut String, heading: &str, items: &[String]) {
    let _ = writeln!(out, "\n{}:", heading);
    if items.is_empty() {
        out.push_str("Not available\n");
    }
    for item in items {
        let _ = writeln!(out, "• {}", item);
    }
}

fn non_empty<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextStatus, FetchMethod, OrganicHit};

    fn completed_context() -> WebsiteContext {
        let mut ctx = WebsiteContext::processing("https://acme.io/", None);
        ctx.status = ContextStatus::Completed;
        ctx.title = Some("Acme Analytics".into());
        ctx.description = Some("Dashboards for small teams".into());
        ctx.content = Some("x".repeat(5000));
        ctx.search_terms = (0..12).map(|i| format!("term{}", i)).collect();
        ctx.search_results = (0..5)
            .map(|i| SearchResult {
                query: format!("term{}", i),
                organic_hits: (0..5)
                    .map(|j| OrganicHit {
                        title: format!("Hit {}-{}", i, j),
                        link: format!("https://hit{}-{}.com", i, j),
                        snippet: format!("snippet {}-{}", i, j),
                    })
                    .collect(),
            })
            .collect();
        ctx.analysis = Some(Analysis::Structured(MarketingAnalysis {
            business_overview: "B2B analytics vendor".into(),
            key_strengths: vec!["Simple pricing".into()],
            market_opportunities: vec!["Agencies".into()],
            competitive_landscape: "Crowded".into(),
            recommended_focus_areas: vec!["SEO".into()],
        }));
        ctx
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[test]
    fn test_grounding_prompt_bounds() {
        let prompt = grounding_prompt(&completed_context(), 2000);

        assert!(prompt.contains("URL: https://acme.io/"));
        assert!(prompt.contains("Title: Acme Analytics"));
        assert!(prompt.contains("B2B analytics vendor"));
        assert!(prompt.contains("• Simple pricing"));
        assert!(prompt.contains("• SEO"));

        // Content prefix is bounded.
        assert!(prompt.contains(&"x".repeat(2000)));
        assert!(!prompt.contains(&"x".repeat(2001)));

        // First 8 terms only.
        assert!(prompt.contains("term7"));
        assert!(!prompt.contains("term8"));

        // First 3 results with 3 hits each.
        assert!(prompt.contains("Query: term2"));
        assert!(!prompt.contains("Query: term3"));
        assert!(prompt.contains("snippet 0-2"));
        assert!(!prompt.contains("snippet 0-3"));
    }

    #[test]
    fn test_grounding_prompt_tolerates_text_analysis() {
        let mut ctx = completed_context();
        ctx.analysis = Some(Analysis::Text("Free-form notes".into()));
        ctx.search_results.clear();
        let prompt = grounding_prompt(&ctx, 100);
        assert!(prompt.contains("Free-form notes"));
        assert!(prompt.contains("No competitive data available"));
        assert!(!prompt.contains("KEY STRENGTHS"));
    }

    #[test]
    fn test_analysis_prompt_lists_competitors() {
        let page = FetchedPage {
            url: "https://acme.io/".into(),
            domain: "acme.io".into(),
            title: "Acme".into(),
            description: String::new(),
            keywords: String::new(),
            content: "body".into(),
            raw_html_length: 10,
            method: FetchMethod::Fallback,
        };
        let results = vec![SearchResult {
            query: "analytics".into(),
            organic_hits: vec![OrganicHit {
                title: "Rival".into(),
                link: "https://rival.com".into(),
                snippet: String::new(),
            }],
        }];
        let prompt = analysis_prompt(&page, &results);
        assert!(prompt.contains("Search: \"analytics\""));
        assert!(prompt.contains("Rival (https://rival.com)"));
        assert!(prompt.contains("businessOverview"));

        let prompt = analysis_prompt(&page, &[]);
        assert!(prompt.contains("No competitor data available"));
    }

    #[test]
    fn test_term_prompt_asks_for_json_array() {
        let page = FetchedPage {
            url: "https://acme.io/".into(),
            domain: "acme.io".into(),
            title: "Acme".into(),
            description: String::new(),
            keywords: String::new(),
            content: "y".repeat(3000),
            raw_html_length: 10,
            method: FetchMethod::Primary,
        };
        let prompt = term_prompt(&page, 6);
        assert!(prompt.contains("up to 6"));
        assert!(prompt.contains("JSON array"));
        assert!(!prompt.contains(&"y".repeat(2001)));
    }
}

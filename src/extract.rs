//! HTML text and metadata extraction.
//!
//! Two extractors share one output type:
//!
//! | Function | Used by | Technique |
//! |----------|---------|-----------|
//! | [`extract_with_regex`] | HTTP fallback fetch | Regex over raw markup |
//! | [`extract_rendered`] | Browser (primary) fetch | DOM walk with `scraper` |
//!
//! Both remove `script`, `style`, `nav`, `header`, `footer` and `noscript`
//! content before collecting text, collapse whitespace, and cap the body at
//! `content_cap` characters with a trailing `...`.

use regex::Regex;
use scraper::{Html, Node, Selector};
use std::sync::LazyLock;

use site_context_core::text::cap_with_ellipsis;

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "nav", "header", "footer", "noscript"];

/// Title, meta tags, and visible text of one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedHtml {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub content: String,
}

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern should compile")
});

static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern should compile"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern should compile")
});

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern should compile"));

// One pattern per element: the regex crate has no backreferences.
static SKIPPED_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SKIPPED_ELEMENTS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("element pattern should compile")
        })
        .collect()
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern should compile"));

static WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern should compile"));

/// Regex-based extraction over raw HTML.
pub fn extract_with_regex(html: &str, content_cap: usize) -> ExtractedHtml {
    let title = TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| clean_inline(m.as_str()))
        .unwrap_or_default();

    let description = meta_content(html, &["description", "og:description"]);
    let keywords = meta_content(html, &["keywords"]);

    let mut body = COMMENT_RE.replace_all(html, " ").into_owned();
    for re in SKIPPED_RES.iter() {
        body = re.replace_all(&body, " ").into_owned();
    }
    let text = TAG_RE.replace_all(&body, " ");
    let content = clean_inline(&text);

    ExtractedHtml {
        title,
        description,
        keywords,
        content: cap_with_ellipsis(&content, content_cap),
    }
}

/// DOM-based extraction for rendered markup.
pub fn extract_rendered(html: &str, content_cap: usize) -> ExtractedHtml {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| clean_inline(&el.text().collect::<String>()))
        .unwrap_or_default();

    let meta = |names: &[&str]| -> String {
        let Ok(sel) = Selector::parse("meta") else {
            return String::new();
        };
        for name in names {
            for el in document.select(&sel) {
                let attr = el
                    .value()
                    .attr("name")
                    .or_else(|| el.value().attr("property"));
                if attr.is_some_and(|a| a.eq_ignore_ascii_case(name)) {
                    if let Some(content) = el.value().attr("content") {
                        return clean_inline(content);
                    }
                }
            }
        }
        String::new()
    };
    let description = meta(&["description", "og:description"]);
    let keywords = meta(&["keywords"]);

    let mut parts = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(el) => SKIPPED_ELEMENTS.contains(&el.name()) || el.name() == "head",
            _ => false,
        });
        if !hidden {
            let text: &str = text;
            parts.push(text.to_string());
        }
    }
    let content = WS_RE.replace_all(parts.join(" ").trim(), " ").into_owned();

    ExtractedHtml {
        title,
        description,
        keywords,
        content: cap_with_ellipsis(&content, content_cap),
    }
}

/// First `content` attribute of a `<meta>` whose `name`/`property` matches,
/// trying `names` in order.
fn meta_content(html: &str, names: &[&str]) -> String {
    let tags: Vec<Vec<(String, String)>> = META_RE
        .find_iter(html)
        .map(|m| parse_attrs(m.as_str()))
        .collect();

    for name in names {
        for attrs in &tags {
            let matches = attrs
                .iter()
                .any(|(k, v)| (k == "name" || k == "property") && v.eq_ignore_ascii_case(name));
            if !matches {
                continue;
            }
            if let Some((_, v)) = attrs.iter().find(|(k, _)| k == "content") {
                return clean_inline(v);
            }
        }
    }
    String::new()
}

fn parse_attrs(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .filter_map(|c| {
            let key = c.get(1)?.as_str().to_ascii_lowercase();
            let value = c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4))?;
            Some((key, value.as_str().to_string()))
        })
        .collect()
}

/// Decode entities and collapse whitespace.
fn clean_inline(s: &str) -> String {
    let decoded = decode_entities(s);
    WS_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Decode the handful of entities common in titles and meta tags.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title> Acme &amp; Co | Roofing </title>
  <meta name="Description" content="Roof repair in Springfield">
  <meta content='roofing, gutters' name='keywords'>
  <style>.x { color: red }</style>
  <script>var tracking = "do not index";</script>
</head>
<body>
  <header><a href="/">Home</a> Menu</header>
  <nav>About Contact</nav>
  <!-- hidden comment -->
  <h1>Storm damage?</h1>
  <p>We fix   roofs
     fast.</p>
  <noscript>Enable JS</noscript>
  <footer>Copyright 2024</footer>
</body>
</html>"#;

    #[test]
    fn test_regex_extracts_metadata() {
        let page = extract_with_regex(PAGE, 8000);
        assert_eq!(page.title, "Acme & Co | Roofing");
        assert_eq!(page.description, "Roof repair in Springfield");
        assert_eq!(page.keywords, "roofing, gutters");
    }

    #[test]
    fn test_regex_strips_boilerplate() {
        let page = extract_with_regex(PAGE, 8000);
        assert!(page.content.contains("Storm damage? We fix roofs fast."));
        for hidden in ["tracking", "color", "Menu", "About", "Copyright", "hidden comment", "Enable JS"] {
            assert!(!page.content.contains(hidden), "leaked {:?}", hidden);
        }
    }

    #[test]
    fn test_rendered_matches_regex_on_simple_page() {
        let rendered = extract_rendered(PAGE, 8000);
        assert_eq!(rendered.title, "Acme & Co | Roofing");
        assert_eq!(rendered.description, "Roof repair in Springfield");
        assert_eq!(rendered.keywords, "roofing, gutters");
        assert!(rendered.content.contains("Storm damage?"));
        assert!(rendered.content.contains("We fix roofs fast."));
        assert!(!rendered.content.contains("Copyright"));
        assert!(!rendered.content.contains("tracking"));
        assert!(!rendered.content.contains("Acme"));
    }

    #[test]
    fn test_content_is_capped_with_marker() {
        let html = format!("<html><body><p>{}</p></body></html>", "word ".repeat(100));
        let page = extract_with_regex(&html, 20);
        assert_eq!(page.content.chars().count(), 23);
        assert!(page.content.ends_with("..."));

        let page = extract_rendered(&html, 20);
        assert!(page.content.ends_with("..."));
    }

    #[test]
    fn test_og_description_fallback() {
        let html = r#"<head><meta property="og:description" content="Open graph text"></head>"#;
        assert_eq!(extract_with_regex(html, 100).description, "Open graph text");
        assert_eq!(extract_rendered(html, 100).description, "Open graph text");
    }

    #[test]
    fn test_missing_metadata_is_empty() {
        let page = extract_with_regex("<p>plain</p>", 100);
        assert_eq!(page.title, "");
        assert_eq!(page.description, "");
        assert_eq!(page.content, "plain");
    }
}

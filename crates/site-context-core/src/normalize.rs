//! URL normalization and validation.
//!
//! Free-text input such as `"example.com"` or `"  HTTP://Example.com/Pricing "`
//! is turned into a canonical absolute URL. The canonical form is also the
//! cache key for the context store, so every caller must normalize before
//! touching the store.
//!
//! ```rust
//! use site_context_core::normalize::normalize_url;
//!
//! let n = normalize_url("www.example.com").unwrap();
//! assert_eq!(n.url, "https://www.example.com/");
//! assert_eq!(n.domain, "example.com");
//! ```

use url::Url;

use crate::error::{SiteError, SiteResult};

/// A validated absolute URL plus its bare host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Canonical serialization (`https://example.com/`).
    pub url: String,
    /// Hostname with any leading `www.` removed.
    pub domain: String,
}

/// Normalize raw user input into a [`NormalizedUrl`].
///
/// Input is trimmed and, when it has no `http://` or `https://` scheme,
/// `https://` is prepended before parsing.
///
/// # Errors
///
/// [`SiteError::Validation`] when the input is empty, does not parse, or
/// has no host.
pub fn normalize_url(raw: &str) -> SiteResult<NormalizedUrl> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SiteError::Validation("URL is required".to_string()));
    }

    let candidate = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed =
        Url::parse(&candidate).map_err(|_| SiteError::Validation("Invalid URL format".into()))?;

    let host = match parsed.host_str() {
        Some(h) if !h.is_empty() => h,
        _ => return Err(SiteError::Validation("Invalid URL format".into())),
    };

    let domain = host.strip_prefix("www.").unwrap_or(host).to_string();

    Ok(NormalizedUrl {
        url: parsed.to_string(),
        domain,
    })
}

/// Bare host of an already-canonical URL, without `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

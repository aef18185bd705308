//! Character-safe truncation helpers.

/// Marker appended to content that was cut at the cap.
pub const ELLIPSIS: &str = "...";

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Cap `s` at `max_chars` characters, appending [`ELLIPSIS`] if anything was cut.
pub fn cap_with_ellipsis(s: &str, max_chars: usize) -> String {
    let prefix = truncate_chars(s, max_chars);
    if prefix.len() < s.len() {
        format!("{}{}", prefix, ELLIPSIS)
    } else {
        s.to_string()
    }
}

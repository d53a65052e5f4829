use std::sync::LazyLock;

use regex::Regex;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));

/// Strips `<...>` markup and collapses whitespace runs to single spaces.
///
/// Tags are replaced by a space so `<p>a</p><p>b</p>` keeps its words apart.
/// Unterminated markup is left as text. Entities are not decoded.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let stripped = TAG_PATTERN.replace_all(raw, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_opt(raw: Option<&str>) -> String {
    raw.map(normalize).unwrap_or_default()
}

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

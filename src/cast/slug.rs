//! Lookup-key normalization for advertised device names

use std::sync::LazyLock;

use regex::Regex;

static QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"['\u{2018}\u{2019}]+").expect("valid regex"));

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Normalize a human-readable name into a lowercase ASCII, `-`-joined key
///
/// Non-ASCII text is transliterated first. Quotes are dropped rather than
/// split on, so `"Anna's Room"` becomes `"annas-room"`
#[must_use]
pub fn slugify(name: &str) -> String {
    let lower = deunicode::deunicode(name).to_lowercase();
    let unquoted = QUOTES.replace_all(&lower, "");
    SEPARATORS
        .replace_all(&unquoted, "-")
        .trim_matches('-')
        .to_string()
}

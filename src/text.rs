// src/text.rs
//! Character-safe text helpers. All limits count Unicode scalar values
//! (`char`s), never bytes, so a multi-byte character is never split.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Marker appended by [`truncate_with_ellipsis`].
pub const ELLIPSIS: &str = "...";

/// Number of characters in `s`.
pub fn rune_len(s: &str) -> usize {
    s.chars().count()
}

/// Hard cut at `max` characters. Borrows when nothing needs to be removed.
pub fn truncate_runes(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Fit `s` into `limit` characters.
///
/// If `s` is too long and `limit > 3`, keep `limit - 3` characters and append
/// `"..."`; with a smaller limit, hard-cut at `limit`. The result never exceeds
/// `limit` characters, and applying the function twice is the same as once.
pub fn truncate_with_ellipsis(s: &str, limit: usize) -> String {
    if rune_len(s) <= limit {
        return s.to_string();
    }
    if limit <= ELLIPSIS.len() {
        return truncate_runes(s, limit).to_string();
    }
    let mut out = truncate_runes(s, limit - ELLIPSIS.len()).to_string();
    out.push_str(ELLIPSIS);
    out
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}

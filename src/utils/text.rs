//! Text normalization used when deriving conversation titles.

/// Suffix appended to text cut by [`truncate`].
pub const ELLIPSIS: &str = "...";

/// Replace control whitespace with spaces, collapse runs of whitespace, and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters, ending in [`ELLIPSIS`] when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

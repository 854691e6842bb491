//! Text helpers for user-facing output.

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Truncate `text` to at most `max` characters, ending in [`ELLIPSIS`] when cut.
///
/// Lengths are counted in characters, not bytes, so multi-byte text is never
/// split inside a code point.
///
/// # Examples
///
/// ```
/// use modwatch::utils::text::truncate;
///
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("a longer sentence", 10), "a longe...");
/// ```
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

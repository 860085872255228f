//! Text normalization shared by broadcast and direct messages.

/// Collapses every whitespace run to a single space and trims both ends.
///
/// ```
/// use relay_core::normalize_text;
///
/// assert_eq!(normalize_text("  a \t\t b\n c  "), "a b c");
/// ```
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

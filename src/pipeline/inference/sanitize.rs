//! Label sanitization for filesystem use.

/// Label used whenever classification fails or sanitization empties it.
pub const FALLBACK_LABEL: &str = "Uncategorized";

/// Filter a label to letters, digits, space, `-`, `_` and trim it; an empty
/// result falls back to [`FALLBACK_LABEL`]. The output is safe as a
/// directory name under an output root.
pub fn sanitize_label(label: &str) -> String {
    let charset = regex::Regex::new(r"[^A-Za-z0-9 _-]").expect("static regex");
    let cleaned = charset.replace_all(label, "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

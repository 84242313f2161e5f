//! Small text helpers for config values and remote error bodies.

const MAX_ERROR_BODY_CHARS: usize = 180;

/// Trimmed value, or `None` for missing or blank input.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Trimmed value of a field that must not be blank.
pub fn required_text(value: &str, field: &str) -> Result<String, String> {
    normalize_text_option(Some(value.to_string())).ok_or_else(|| format!("{field} is required"))
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(*scheme))
}

/// Error bodies are echoed into sync errors; keep them to one short line.
pub fn compact_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect()
}

/// Normalize an HTTP base URL: trimmed, scheme required, no trailing slash.
pub fn normalize_base_url(raw: &str, field: &str) -> Result<String, String> {
    let base = required_text(raw, field)?;
    let base = base.trim_end_matches('/');
    if !is_http_url(base) {
        return Err(format!("{field} must include http:// or https://"));
    }
    Ok(base.to_string())
}

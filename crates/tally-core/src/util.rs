//! Small helpers for settings normalization and timestamps.

/// Trim `value`, treating blank input the same as a missing one.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Milliseconds since the Unix epoch, the unit every stored timestamp uses.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Small helpers shared by the config loader and the HTTP client.

/// Trim optional text and drop it when nothing is left.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Validate an http(s) base URL and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Truncate a response body to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_blank() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("  ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" v1 ".to_string())),
            Some("v1".to_string())
        );
    }

    #[test]
    fn normalize_base_url_requires_scheme() {
        assert_eq!(
            normalize_base_url(" https://pass.example.com/api/ "),
            Some("https://pass.example.com/api".to_string())
        );
        assert_eq!(normalize_base_url("pass.example.com"), None);
        assert_eq!(normalize_base_url(""), None);
    }

    #[test]
    fn compact_text_truncates() {
        assert_eq!(compact_text(&"x".repeat(500)).len(), 180);
    }
}

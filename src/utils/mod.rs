//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Validate a configured base URL, returning it with any trailing slash
/// trimmed so endpoint paths can be appended uniformly.
pub fn normalize_base_url(raw: &str) -> crate::error::Result<String> {
    let parsed = Url::parse(raw)?;
    let mut text = parsed.to_string();
    while text.ends_with('/') {
        text.pop();
    }
    Ok(text)
}

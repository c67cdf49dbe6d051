//! Shared utilities for resolver modules: static regex compilation, field
//! extraction and response-to-text helpers.

use regex::Regex;
use reqwest::Client;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Returns the first capture of `regex` in `text`, trimmed; `None` when empty.
#[must_use]
pub fn extract_field(text: &str, regex: &Regex) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|value| !value.is_empty())
}

/// Fetches `url` and returns the body when the status is a success.
///
/// The error string describes the transport failure or the HTTP status.
pub(crate) async fn fetch_text(client: &Client, url: &str) -> Result<String, String> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            "request timed out".to_string()
        } else {
            format!("request failed: {e}")
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| format!("failed to read body: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field_trims_capture() {
        let re = compile_static_regex(r"Title:([^<]+)<br>");
        assert_eq!(
            extract_field("Title:  Dune <br>", &re).as_deref(),
            Some("Dune")
        );
    }

    #[test]
    fn test_extract_field_blank_capture_is_none() {
        let re = compile_static_regex(r"ISBN:([^<]*)<br>");
        assert!(extract_field("ISBN:   <br>", &re).is_none());
    }

    #[test]
    fn test_extract_field_missing_is_none() {
        let re = compile_static_regex(r"ISBN:([^<]*)<br>");
        assert!(extract_field("<p>nothing here</p>", &re).is_none());
    }

    #[test]
    #[should_panic(expected = "invalid static regex")]
    fn test_compile_static_regex_panics_on_bad_pattern() {
        let _ = compile_static_regex("(unclosed");
    }
}

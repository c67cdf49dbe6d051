//! Attachment filename derivation for artifacts fetched over HTTP.

use std::path::{Component, Path};

use url::Url;

use crate::resolver::RecordHash;

/// Picks the attachment filename for a fetched artifact.
///
/// Preference order: the `Content-Disposition` filename, the last path
/// segment of the file URL, then `<hash>.epub`.
#[must_use]
pub(crate) fn attachment_filename(
    content_disposition: Option<&str>,
    url: &Url,
    hash: &RecordHash,
) -> String {
    content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| last_path_segment(url))
        .map(|name| sanitize_filename(&name))
        .filter(|name| !name.trim_matches('_').is_empty())
        .unwrap_or_else(|| format!("{hash}.epub"))
}

/// Extracts the filename parameter of a `Content-Disposition` header.
///
/// The RFC 5987 `filename*` form wins over plain `filename`.
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.trim().split_once("''").map_or(value, |(_, v)| v);
                if let Ok(decoded) = urlencoding::decode(encoded.trim()) {
                    return Some(decoded.into_owned()).filter(|name| !name.is_empty());
                }
            }
            "filename" => {
                let name = value.trim().trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

fn last_path_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    (!decoded.is_empty()).then(|| decoded.into_owned())
}

/// Replaces characters that are unsafe in a filename or mail attachment name.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let escapes = Path::new(&cleaned)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="Effective Java.epub""#),
            Some("Effective Java.epub".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted_with_trailing_param() {
        assert_eq!(
            parse_content_disposition("attachment; filename=book.epub; size=10"),
            Some("book.epub".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_prefers_extended_form() {
        let header = "attachment; filename=\"fallback.epub\"; filename*=UTF-8''%D7%A1%D7%A4%D7%A8.epub";
        assert_eq!(parse_content_disposition(header), Some("ספר.epub".to_string()));
    }

    #[test]
    fn test_parse_content_disposition_missing_filename() {
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_attachment_filename_uses_header_first() {
        let name = attachment_filename(
            Some("attachment; filename=\"a/b.epub\""),
            &url("https://files.test/dl/other.epub"),
            &RecordHash::new("aa11"),
        );
        assert_eq!(name, "a_b.epub");
    }

    #[test]
    fn test_attachment_filename_falls_back_to_url_segment() {
        let name = attachment_filename(
            None,
            &url("https://files.test/dl/My%20Book.epub"),
            &RecordHash::new("aa11"),
        );
        assert_eq!(name, "My Book.epub");
    }

    #[test]
    fn test_attachment_filename_falls_back_to_hash() {
        let name = attachment_filename(None, &url("https://files.test/"), &RecordHash::new("AA11"));
        assert_eq!(name, "aa11.epub");
    }

    #[test]
    fn test_sanitize_filename_neutralizes_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("book.epub"), "book.epub");
    }
}

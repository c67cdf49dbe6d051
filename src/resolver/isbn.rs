//! Identifier resolver: extracts the ISBN from a catalog source page.
//!
//! This is a best-effort text scrape. The first 10–13 digit run that follows
//! the token `isbn` (case-insensitive, at most three separator characters in
//! between) wins; a wrong adjacent number is an accepted limitation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::ResolveError;
use super::http_client::build_http_client;
use super::utils::{compile_static_regex, fetch_text};

static ISBN_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)isbn[^0-9]{0,3}([0-9]{10,13})(?:[^0-9]|$)"));

/// Normalized book identifier: 10 to 13 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Isbn(String);

impl Isbn {
    /// Parses and normalizes an identifier, dropping hyphens and spaces.
    ///
    /// Returns `None` unless the remainder is 10 to 13 digits.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let digits: String = value
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .collect();
        let valid = (10..=13).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
        valid.then_some(Self(digits))
    }

    /// Returns the identifier digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the first ISBN adjacent to an `isbn` token in `text`.
#[must_use]
pub fn extract_isbn(text: &str) -> Option<Isbn> {
    ISBN_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| Isbn::parse(m.as_str()))
}

/// Fetches source pages and scrapes their ISBN.
#[derive(Debug, Clone)]
pub struct IsbnResolver {
    client: Client,
}

impl IsbnResolver {
    /// Creates a resolver with the shared HTTP client policy.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when HTTP client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        let client =
            build_http_client("isbn").map_err(|e| ResolveError::client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a resolver around an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Resolves the ISBN of the book described by `source_url`.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::InvalidSource`] when the URL is malformed, not
    ///   http(s), unreachable, or answers with a non-success status.
    /// - [`ResolveError::IdentifierNotFound`] when the page carries no ISBN.
    #[tracing::instrument(skip(self), fields(url = %source_url))]
    pub async fn resolve(&self, source_url: &str) -> Result<Isbn, ResolveError> {
        let parsed = Url::parse(source_url)
            .map_err(|e| ResolveError::invalid_source(source_url, &e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ResolveError::invalid_source(
                source_url,
                "only http and https sources are supported",
            ));
        }

        let page = fetch_text(&self.client, parsed.as_str())
            .await
            .map_err(|reason| ResolveError::invalid_source(source_url, &reason))?;
        debug!(bytes = page.len(), "fetched source page");

        let isbn = extract_isbn(&page).ok_or_else(|| ResolveError::identifier_not_found(source_url))?;
        info!(isbn = %isbn, "resolved identifier");
        Ok(isbn)
    }
}

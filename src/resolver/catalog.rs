//! Candidate link resolver: finds the record hashes the metadata index lists
//! for an identifier.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::http_client::build_http_client;
use super::utils::{compile_static_regex, fetch_text};
use super::{Isbn, ResolveError};
use crate::config::PipelineConfig;

static RECORD_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?i)href\s*=\s*["'][^"']*?/md5/([0-9a-f]+)["'?#/]"#)
});

/// Content hash naming one catalog entry in the metadata index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordHash(String);

impl RecordHash {
    /// Creates a record hash, lowercasing the hex digits.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_ascii_lowercase())
    }

    /// Returns the hash string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts record hashes from `/md5/<hash>` anchors in result order.
///
/// A hash linked more than once (cover and title anchors) is kept at its
/// first position.
#[must_use]
pub fn extract_record_hashes(html: &str) -> Vec<RecordHash> {
    let mut seen = HashSet::new();
    RECORD_HASH_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| RecordHash::new(m.as_str()))
        .filter(|hash| seen.insert(hash.clone()))
        .collect()
}

/// Searches the metadata index for record hashes of an identifier.
#[derive(Debug, Clone)]
pub struct CatalogSearch {
    client: Client,
    index_url: String,
    format: String,
    languages: Vec<String>,
}

impl CatalogSearch {
    /// Creates a search client for the index, format and languages in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when HTTP client construction fails.
    pub fn new(config: &PipelineConfig) -> Result<Self, ResolveError> {
        let client =
            build_http_client("catalog").map_err(|e| ResolveError::client(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a search client around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, config: &PipelineConfig) -> Self {
        Self {
            client,
            index_url: config.metadata_index_url.trim_end_matches('/').to_string(),
            format: config.search_format.clone(),
            languages: config.search_languages.clone(),
        }
    }

    /// Builds the search URL for `isbn`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::IndexUnavailable`] when the index URL is invalid.
    pub fn search_url(&self, isbn: &Isbn) -> Result<Url, ResolveError> {
        let base = format!("{}/search", self.index_url);
        let mut url = Url::parse(&base)
            .map_err(|e| ResolveError::index_unavailable(&base, &e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", isbn.as_str());
            query.append_pair("ext", &self.format);
            for language in &self.languages {
                query.append_pair("lang", language);
            }
        }
        Ok(url)
    }

    /// Returns the record hashes listed for `isbn`, in search-result order.
    ///
    /// An empty result is not an error; the caller decides what it means.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::IndexUnavailable`] when the search request fails.
    #[tracing::instrument(skip(self), fields(isbn = %isbn))]
    pub async fn record_hashes(&self, isbn: &Isbn) -> Result<Vec<RecordHash>, ResolveError> {
        let url = self.search_url(isbn)?;
        let page = fetch_text(&self.client, url.as_str())
            .await
            .map_err(|reason| ResolveError::index_unavailable(url.as_str(), &reason))?;

        let hashes = extract_record_hashes(&page);
        debug!(bytes = page.len(), "fetched search results");
        info!(count = hashes.len(), "found record hashes");
        Ok(hashes)
    }
}

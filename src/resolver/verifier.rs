//! Link verifier: turns record hashes into a live, ISBN-checked download link.
//!
//! A record hash can belong to a different edition than the one requested
//! (same title, different printing). Each live candidate's page is scraped
//! for its bibliographic fields and the listed ISBN is checked against the
//! requested identifier. Pages without an ISBN field are accepted: partial
//! metadata is common on mirror pages, and availability wins over strictness.

use std::sync::LazyLock;

use futures_util::future::join_all;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, instrument};

use super::http_client::build_http_client;
use super::utils::{compile_static_regex, extract_field, fetch_text};
use super::{Isbn, RecordHash, ResolveError};
use crate::mirror::{MirrorEndpoint, MirrorProber};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Title:\s*([^<]+?)\s*<br"));
static AUTHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Author\(s\):\s*([^<]+?)\s*<br"));
static ISBN_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"ISBN:\s*([0-9Xx\- ;,]+?)\s*<br"));

/// Bibliographic fields scraped from a candidate's download page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    /// Listed title.
    pub title: Option<String>,
    /// Listed author(s).
    pub author: Option<String>,
    /// Listed ISBN field (may hold several identifiers).
    pub isbn: Option<String>,
}

impl BookMetadata {
    /// Scrapes the metadata fields out of a page.
    #[must_use]
    pub fn from_page(html: &str) -> Self {
        Self {
            title: extract_field(html, &TITLE_RE),
            author: extract_field(html, &AUTHOR_RE),
            isbn: extract_field(html, &ISBN_FIELD_RE),
        }
    }

    /// True when one of the listed identifiers contains `isbn`, or no ISBN
    /// is listed. Hyphens and spaces inside an identifier are ignored.
    #[must_use]
    pub fn matches(&self, isbn: &Isbn) -> bool {
        self.isbn.as_deref().is_none_or(|listed| {
            listed.split([';', ',']).any(|entry| {
                let compact: String = entry
                    .chars()
                    .filter(|c| *c != '-' && !c.is_whitespace())
                    .collect();
                compact.contains(isbn.as_str())
            })
        })
    }
}

/// A record hash resolved to a concrete mirror download URL.
#[derive(Debug, Clone)]
pub struct CandidateLink {
    /// Record the link was built from.
    pub hash: RecordHash,
    /// Mirror serving the link.
    pub mirror: MirrorEndpoint,
    /// Download page URL.
    pub url: String,
    /// Whether the link answered its liveness probe.
    pub live: bool,
    /// Scraped metadata, once fetched.
    pub metadata: Option<BookMetadata>,
}

impl CandidateLink {
    /// Builds the candidate for `hash` on `mirror`.
    #[must_use]
    pub fn new(hash: RecordHash, mirror: &MirrorEndpoint) -> Self {
        Self {
            url: mirror.download_link(&hash),
            hash,
            mirror: mirror.clone(),
            live: false,
            metadata: None,
        }
    }

    /// A link is accepted only when it is live and its page was read.
    ///
    /// A live link whose page could not be fetched is rejected even though
    /// it lists no ISBN: the agent would open that same page next.
    fn accepts(&self, isbn: &Isbn) -> bool {
        self.live && self.metadata.as_ref().is_some_and(|meta| meta.matches(isbn))
    }
}

/// Probes and verifies candidate links.
#[derive(Debug, Clone)]
pub struct LinkVerifier {
    client: Client,
    prober: MirrorProber,
}

impl LinkVerifier {
    /// Creates a verifier using `prober` for liveness checks.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when HTTP client construction fails.
    pub fn new(prober: MirrorProber) -> Result<Self, ResolveError> {
        let client =
            build_http_client("verifier").map_err(|e| ResolveError::client(e.to_string()))?;
        Ok(Self { client, prober })
    }

    /// Creates a verifier around an existing scrape client.
    #[must_use]
    pub fn with_client(client: Client, prober: MirrorProber) -> Self {
        Self { client, prober }
    }

    /// Builds, probes and scrapes every candidate for `hashes` on `mirror`.
    ///
    /// Returned candidates keep the hash order; dead links carry
    /// `live == false`, and links whose page could not be fetched carry no
    /// metadata.
    pub async fn inspect(&self, hashes: &[RecordHash], mirror: &MirrorEndpoint) -> Vec<CandidateLink> {
        let mut links: Vec<CandidateLink> = hashes
            .iter()
            .map(|hash| CandidateLink::new(hash.clone(), mirror))
            .collect();

        let urls: Vec<String> = links.iter().map(|link| link.url.clone()).collect();
        let status = self.prober.probe_all_ok(&urls).await;
        for (link, alive) in links.iter_mut().zip(status) {
            link.live = alive.is_some();
        }

        let pages = join_all(
            links
                .iter()
                .filter(|link| link.live)
                .map(|link| fetch_text(&self.client, &link.url)),
        )
        .await;

        for (link, page) in links.iter_mut().filter(|link| link.live).zip(pages) {
            match page {
                Ok(html) => link.metadata = Some(BookMetadata::from_page(&html)),
                Err(reason) => debug!(url = %link.url, reason, "candidate page fetch failed"),
            }
        }
        links
    }

    /// Returns the first live candidate whose metadata matches `isbn`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::BookNotFound`] when no live candidate is
    /// accepted.
    #[instrument(skip(self, hashes), fields(isbn = %isbn, mirror = %mirror, candidates = hashes.len()))]
    pub async fn select(
        &self,
        isbn: &Isbn,
        hashes: &[RecordHash],
        mirror: &MirrorEndpoint,
    ) -> Result<CandidateLink, ResolveError> {
        if hashes.is_empty() {
            return Err(ResolveError::book_not_found(isbn.as_str(), "no catalog records"));
        }

        let links = self.inspect(hashes, mirror).await;
        let live = links.iter().filter(|link| link.live).count();
        debug!(live, total = links.len(), "candidate liveness");

        for link in &links {
            if let Some(meta) = &link.metadata
                && !meta.matches(isbn)
            {
                debug!(
                    url = %link.url,
                    listed_isbn = meta.isbn.as_deref().unwrap_or(""),
                    "rejected candidate with mismatching ISBN"
                );
            }
        }

        let chosen = links.into_iter().find(|link| link.accepts(isbn)).ok_or_else(|| {
            ResolveError::book_not_found(isbn.as_str(), "no live link with matching metadata")
        })?;

        info!(
            url = %chosen.url,
            title = chosen.metadata.as_ref().and_then(|m| m.title.as_deref()).unwrap_or(""),
            "verified candidate link"
        );
        Ok(chosen)
    }
}

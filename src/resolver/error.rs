//! Error types for resolver operations.
//!
//! This module defines structured errors for identifier extraction, record
//! hash search and candidate verification, following the What/Why/Fix
//! pattern used across the project.

use thiserror::Error;

/// Errors that can occur while resolving a source page to a verified link.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The source URL is malformed or could not be fetched.
    #[error("invalid source '{url}': {reason}\n  Suggestion: Check that the catalog page URL is correct and reachable")]
    InvalidSource {
        /// The source URL as given by the caller.
        url: String,
        /// Why the source was rejected.
        reason: String,
    },

    /// The source page contains no recognizable ISBN.
    #[error("no ISBN found on source page '{url}'\n  Suggestion: Use a catalog page for a specific edition")]
    IdentifierNotFound {
        /// The source URL that was scraped.
        url: String,
    },

    /// No catalog entry matched the identifier.
    #[error("no book found for ISBN {isbn}: {reason}")]
    BookNotFound {
        /// The requested identifier.
        isbn: String,
        /// Which stage came up empty.
        reason: String,
    },

    /// The metadata index could not be queried.
    #[error("metadata index request failed for '{url}': {reason}")]
    IndexUnavailable {
        /// The search URL.
        url: String,
        /// Transport or status description.
        reason: String,
    },

    /// HTTP client construction failed.
    #[error("resolver networking unavailable: {reason}")]
    Client {
        /// Why the client could not be built.
        reason: String,
    },
}

impl ResolveError {
    /// Creates an `InvalidSource` error.
    #[must_use]
    pub fn invalid_source(url: &str, reason: &str) -> Self {
        Self::InvalidSource {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `IdentifierNotFound` error.
    #[must_use]
    pub fn identifier_not_found(url: &str) -> Self {
        Self::IdentifierNotFound {
            url: url.to_string(),
        }
    }

    /// Creates a `BookNotFound` error.
    #[must_use]
    pub fn book_not_found(isbn: &str, reason: &str) -> Self {
        Self::BookNotFound {
            isbn: isbn.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `IndexUnavailable` error.
    #[must_use]
    pub fn index_unavailable(url: &str, reason: &str) -> Self {
        Self::IndexUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Client` error.
    #[must_use]
    pub fn client(reason: impl Into<String>) -> Self {
        Self::Client {
            reason: reason.into(),
        }
    }
}

//! Error types for the retrieval phase.

use std::path::PathBuf;

use thiserror::Error;

use super::browser::BrowserError;

/// Coarse failure class used to pick a recovery route.
///
/// Connectivity failures mean the mirror or browser could not be reached;
/// extraction failures mean the page loaded but yielded no file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transport, navigation or session start failure.
    Connectivity,
    /// Page loaded but the file could not be obtained from it.
    Extraction,
}

/// Errors raised while retrieving an artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The browser session could not be started.
    #[error("browser session unavailable: {source}")]
    Launch {
        /// Underlying browser error.
        #[source]
        source: BrowserError,
    },

    /// The download page could not be opened.
    #[error("could not open {url}: {source}")]
    Navigation {
        /// Page URL.
        url: String,
        /// Underlying browser error.
        #[source]
        source: BrowserError,
    },

    /// The download control never became clickable.
    #[error("download control {locator} not clickable after {attempts} attempt(s): {reason}")]
    ElementNotFound {
        /// Locator of the control.
        locator: String,
        /// Click attempts made, script click included.
        attempts: u32,
        /// Last failure seen.
        reason: String,
    },

    /// No finished file appeared in the download directory in time.
    #[error("no finished download in {dir} within {waited_secs}s")]
    FileNotFound {
        /// Watched directory.
        dir: PathBuf,
        /// Seconds spent waiting.
        waited_secs: u64,
    },

    /// The paid API answered without a download URL.
    #[error("paid API returned no download URL for {hash}")]
    MissingDownloadUrl {
        /// Record hash requested.
        hash: String,
    },

    /// Neither a mirror nor a paid API key is available.
    #[error("no retrieval path: {reason}")]
    NoRetrievalPath {
        /// Why every path is closed.
        reason: String,
    },

    /// HTTP failure talking to the paid API or its file host.
    #[error("HTTP request to {url} failed: {reason}")]
    Http {
        /// Request URL (credentials stripped).
        url: String,
        /// Failure description.
        reason: String,
    },

    /// File system failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The agent panicked while driving the browser.
    #[error("retrieval agent panicked: {message}")]
    Panicked {
        /// Panic payload text.
        message: String,
    },
}

impl DownloadError {
    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, source: BrowserError) -> Self {
        Self::Navigation {
            url: url.into(),
            source,
        }
    }

    /// Creates an element-not-found error.
    pub fn element_not_found(locator: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self::ElementNotFound {
            locator: locator.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Creates an HTTP error.
    pub fn http(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the failure class of this error.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Launch { .. } | Self::Navigation { .. } | Self::Http { .. } => {
                FailureClass::Connectivity
            }
            Self::ElementNotFound { .. }
            | Self::FileNotFound { .. }
            | Self::MissingDownloadUrl { .. }
            | Self::NoRetrievalPath { .. }
            | Self::Io { .. }
            | Self::Panicked { .. } => FailureClass::Extraction,
        }
    }
}

//! Artifact retrieval.
//!
//! Two paths produce a [`RetrievedArtifact`](crate::delivery::RetrievedArtifact):
//!
//! - [`RetrievalAgent`] - drives a browser through a mirror page and watches
//!   the download directory ([`DownloadWatcher`]) for the finished file
//! - [`FallbackRetriever`] - asks the paid API for a direct URL and fetches
//!   the file into memory
//!
//! The browser is reached through the [`BrowserLauncher`] / [`BrowserSession`]
//! traits; [`ChromiumLauncher`] is the production implementation.

mod agent;
mod browser;
mod chromium;
mod error;
mod fallback;
mod filename;
mod watcher;

pub use agent::{AgentState, RetrievalAgent};
pub use browser::{BrowserError, BrowserLauncher, BrowserSession, ElementHandle};
pub use chromium::{ChromiumLauncher, ChromiumSession, find_chromium};
pub use error::{DownloadError, FailureClass};
pub use fallback::FallbackRetriever;
pub use watcher::{
    DownloadBaseline, DownloadWatcher, IN_PROGRESS_SUFFIXES, is_in_progress, list_files_blocking,
    newest_file_blocking,
};

//! Bookrelay Core Library
//!
//! This library provides the acquisition pipeline behind the bookrelay tool,
//! which turns a catalog page URL into an e-book delivered to a reading
//! device mailbox.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Explicit pipeline configuration passed into every component
//! - [`mirror`] - Concurrent mirror health probing and mirror selection
//! - [`resolver`] - ISBN extraction, record hash search and link verification
//! - [`download`] - Browser-driven retrieval, download directory watching, paid fallback
//! - [`delivery`] - Mail handoff of the retrieved artifact
//! - [`secrets`] - Credential providers (environment, Bitwarden CLI)
//! - [`pipeline`] - Orchestration, progress notifications and the error taxonomy

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod delivery;
pub mod download;
pub mod mirror;
pub mod pipeline;
pub mod resolver;
pub mod secrets;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use delivery::{
    DeliveryError, DeliveryHandoff, MailAttachment, MailError, MailTransport, OutgoingMail,
    RetrievedArtifact, SmtpMailTransport, redact_address,
};
pub use download::{
    AgentState, BrowserError, BrowserLauncher, BrowserSession, ChromiumLauncher, ChromiumSession,
    DownloadBaseline, DownloadError, DownloadWatcher, ElementHandle, FailureClass, FallbackRetriever,
    RetrievalAgent,
};
pub use mirror::{MirrorEndpoint, MirrorError, MirrorProber, select_mirror};
pub use pipeline::{
    Phase, Pipeline, PipelineError, Progress, ProgressReporter, progress_channel,
};
pub use resolver::{
    BookMetadata, CandidateLink, CatalogSearch, Isbn, IsbnResolver, LinkVerifier, RecordHash,
    ResolveError,
};
pub use secrets::{
    BitwardenSecretProvider, EnvSecretProvider, SecretProvider, Secrets, SecretsError,
};

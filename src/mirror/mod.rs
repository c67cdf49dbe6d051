//! Mirror health probing and mirror selection.
//!
//! Mirrors are independently operated sites serving the same catalog. Their
//! availability changes from hour to hour, so every pipeline run probes the
//! whole configured set concurrently and picks the first live endpoint in
//! static priority order.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bookrelay_core::mirror::{MirrorProber, select_mirror};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = MirrorProber::new(Duration::from_secs(5))?;
//! let mirrors = vec!["https://libgen.is".to_string(), "https://libgen.st".to_string()];
//! let mirror = select_mirror(&prober, &mirrors).await?;
//! println!("using {mirror}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::resolver::RecordHash;
use crate::resolver::http_client::build_http_client_with_timeout;

/// Errors raised while choosing a mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// No configured mirror answered its probe.
    #[error("no live mirror among {tried} configured endpoint(s)")]
    Exhausted {
        /// Number of endpoints probed.
        tried: usize,
    },

    /// The probe client could not be built.
    #[error("mirror prober unavailable: {reason}")]
    Client {
        /// Why the client could not be built.
        reason: String,
    },
}

/// Base URL of one mirror instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEndpoint {
    base: String,
}

impl MirrorEndpoint {
    /// Creates an endpoint, dropping any trailing slash.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Builds this mirror's download page URL for a record hash.
    #[must_use]
    pub fn download_link(&self, hash: &RecordHash) -> String {
        format!("{}/get.php?md5={hash}", self.base)
    }
}

impl fmt::Display for MirrorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// Issues bounded-timeout liveness probes concurrently.
///
/// A transport error or timeout degrades to "not alive"; it never fails the
/// batch. There is no retry at this layer.
#[derive(Debug, Clone)]
pub struct MirrorProber {
    client: Client,
    timeout: Duration,
}

impl MirrorProber {
    /// Creates a prober whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Client`] when HTTP client construction fails.
    pub fn new(timeout: Duration) -> Result<Self, MirrorError> {
        let client = build_http_client_with_timeout("prober", timeout, timeout)
            .map_err(|e| MirrorError::Client {
                reason: e.to_string(),
            })?;
        Ok(Self { client, timeout })
    }

    /// Creates a prober around an existing client.
    #[must_use]
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Returns the per-probe timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes every URL concurrently.
    ///
    /// The result has one entry per input, in input order: `Some(url)` when
    /// the request completed without transport error or timeout, `None`
    /// otherwise. Any HTTP status counts as alive.
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn probe_all(&self, urls: &[String]) -> Vec<Option<String>> {
        self.probe_batch(urls, false).await
    }

    /// Like [`probe_all`](Self::probe_all), but an entry is present only when
    /// the response status is a success.
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn probe_all_ok(&self, urls: &[String]) -> Vec<Option<String>> {
        self.probe_batch(urls, true).await
    }

    async fn probe_batch(&self, urls: &[String], require_success: bool) -> Vec<Option<String>> {
        let probes = urls.iter().map(|url| async move {
            self.probe(url, require_success)
                .await
                .then(|| url.clone())
        });
        let results = join_all(probes).await;
        debug!(
            alive = results.iter().filter(|r| r.is_some()).count(),
            total = results.len(),
            "probe batch finished"
        );
        results
    }

    async fn probe(&self, url: &str, require_success: bool) -> bool {
        match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                let alive = !require_success || status.is_success();
                debug!(url, status = status.as_u16(), alive, "probe answered");
                alive
            }
            Err(error) => {
                debug!(url, timeout = error.is_timeout(), error = %error, "probe failed");
                false
            }
        }
    }
}

/// Returns the first mirror, in static priority order, that probes alive.
///
/// # Errors
///
/// Returns [`MirrorError::Exhausted`] when no mirror is alive.
#[instrument(skip(prober, mirrors), fields(count = mirrors.len()))]
pub async fn select_mirror(
    prober: &MirrorProber,
    mirrors: &[String],
) -> Result<MirrorEndpoint, MirrorError> {
    let status = prober.probe_all(mirrors).await;
    match status.into_iter().flatten().next() {
        Some(url) => {
            info!(mirror = %url, "selected mirror");
            Ok(MirrorEndpoint::new(url))
        }
        None => {
            warn!(tried = mirrors.len(), "no live mirror found");
            Err(MirrorError::Exhausted {
                tried: mirrors.len(),
            })
        }
    }
}

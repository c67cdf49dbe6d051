//! Pipeline orchestration.
//!
//! One [`Pipeline::run`] turns a catalog page URL into a delivered e-book:
//!
//! ```text
//! resolve ISBN -> search catalog -> select mirror -> verify link -> browser download -> deliver
//!                                        |                               |
//!                                   (no mirror)                  (agent failure, by class)
//!                                        v                               v
//!                                   paid API fallback  ------------->  deliver
//! ```
//!
//! Runs share no mutable state; concurrent runs each get their own browser
//! session. There is no retry at this level: a failed run is a failed request.

mod error;
mod progress;

use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, info, info_span, instrument, warn};

pub use error::PipelineError;
pub use progress::{Phase, Progress, ProgressReporter, progress_channel};

use crate::config::PipelineConfig;
use crate::delivery::{DeliveryHandoff, RetrievedArtifact, redact_address};
use crate::download::{BrowserLauncher, DownloadError, FailureClass, FallbackRetriever, RetrievalAgent};
use crate::mirror::{MirrorError, MirrorProber, select_mirror};
use crate::resolver::{CatalogSearch, IsbnResolver, LinkVerifier, RecordHash};

/// Reports `phase`, runs `work` inside a `phase` span and logs its outcome.
async fn run_phase<T, E, F>(progress: &ProgressReporter, phase: Phase, work: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    progress.report(phase);
    let started = Instant::now();
    let result = work.instrument(info_span!("phase", name = phase.label())).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &result {
        Ok(_) => info!(phase = %phase, elapsed_ms, "phase finished"),
        Err(error) => warn!(phase = %phase, elapsed_ms, %error, "phase failed"),
    }
    result
}

/// The acquisition pipeline, built once and shared by every run.
pub struct Pipeline {
    isbn: IsbnResolver,
    catalog: CatalogSearch,
    prober: MirrorProber,
    verifier: LinkVerifier,
    agent: RetrievalAgent,
    fallback: Option<FallbackRetriever>,
    delivery: DeliveryHandoff,
    mirrors: Vec<String>,
    fallback_on_extraction_failure: bool,
}

impl Pipeline {
    /// Builds every component from `config`.
    ///
    /// Without `paid_api_key` the fallback path is unavailable; runs that
    /// need it fail with [`DownloadError::NoRetrievalPath`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Unexpected`] or [`PipelineError::Download`]
    /// when an HTTP client cannot be built.
    pub fn new(
        config: &PipelineConfig,
        launcher: Arc<dyn BrowserLauncher>,
        delivery: DeliveryHandoff,
        paid_api_key: Option<String>,
    ) -> Result<Self, PipelineError> {
        let prober = MirrorProber::new(config.probe_timeout)
            .map_err(|e| PipelineError::Unexpected(e.to_string()))?;
        let fallback = paid_api_key
            .map(|key| FallbackRetriever::new(config, key))
            .transpose()?;
        if fallback.is_none() {
            info!("no paid API key configured; fallback path disabled");
        }

        Ok(Self {
            isbn: IsbnResolver::new()?,
            catalog: CatalogSearch::new(config)?,
            verifier: LinkVerifier::new(prober.clone())?,
            prober,
            agent: RetrievalAgent::new(launcher, config),
            fallback,
            delivery,
            mirrors: config.mirrors.clone(),
            fallback_on_extraction_failure: config.fallback_on_extraction_failure,
        })
    }

    /// True when a paid API key is configured.
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Acquires the book behind `source_url` and mails it to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns the single [`PipelineError`] that ended the run.
    #[instrument(skip_all, fields(source = %source_url, recipient = %redact_address(recipient)))]
    pub async fn run(
        &self,
        source_url: &str,
        recipient: &str,
        progress: &ProgressReporter,
    ) -> Result<(), PipelineError> {
        let isbn = run_phase(progress, Phase::ResolvingIdentifier, self.isbn.resolve(source_url)).await?;

        let hashes = run_phase(progress, Phase::SearchingCatalog, self.catalog.record_hashes(&isbn)).await?;
        let Some(first_hash) = hashes.first().cloned() else {
            return Err(PipelineError::BookNotFound(format!(
                "no catalog records for ISBN {isbn}"
            )));
        };

        let artifact = match run_phase(progress, Phase::SelectingMirror, select_mirror(&self.prober, &self.mirrors)).await {
            Ok(mirror) => {
                let link = run_phase(
                    progress,
                    Phase::VerifyingLink,
                    self.verifier.select(&isbn, &hashes, &mirror),
                )
                .await?;
                let downloaded =
                    run_phase(progress, Phase::Downloading, self.agent.retrieve(&link.url)).await;
                match downloaded {
                    Ok(path) => RetrievedArtifact::OnDisk(path),
                    Err(error) => self.after_agent_failure(error, &link.hash).await?,
                }
            }
            Err(MirrorError::Exhausted { tried }) => {
                warn!(tried, hash = %first_hash, "all mirrors unreachable; using paid API");
                run_phase(progress, Phase::Downloading, self.retrieve_paid(&first_hash)).await?
            }
            Err(other) => return Err(PipelineError::Unexpected(other.to_string())),
        };

        let on_disk = artifact.path().map(Path::to_path_buf);
        let delivered = run_phase(
            progress,
            Phase::Delivering,
            self.delivery.deliver(artifact, recipient),
        )
        .await;
        if let Err(error) = delivered {
            if let Some(path) = on_disk
                && let Err(remove_error) = tokio::fs::remove_file(&path).await
            {
                warn!(path = %path.display(), error = %remove_error, "could not remove undelivered file");
            }
            return Err(error.into());
        }

        progress.report(Phase::Done);
        info!(isbn = %isbn, "run finished");
        Ok(())
    }

    async fn retrieve_paid(&self, hash: &RecordHash) -> Result<RetrievedArtifact, DownloadError> {
        match &self.fallback {
            Some(fallback) => fallback.retrieve(hash).await,
            None => Err(DownloadError::NoRetrievalPath {
                reason: "no mirror reachable and no paid API key configured".to_string(),
            }),
        }
    }

    /// Routes a browser failure to the paid API when its class allows it.
    async fn after_agent_failure(
        &self,
        error: DownloadError,
        hash: &RecordHash,
    ) -> Result<RetrievedArtifact, DownloadError> {
        let class = error.class();
        let eligible = match class {
            FailureClass::Connectivity => true,
            FailureClass::Extraction => self.fallback_on_extraction_failure,
        };
        if !eligible || self.fallback.is_none() {
            return Err(error);
        }
        warn!(?class, %error, hash = %hash, "browser retrieval failed; using paid API");
        self.retrieve_paid(hash).await
    }
}

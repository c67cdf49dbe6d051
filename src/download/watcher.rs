//! Download directory watcher.
//!
//! The browser writes into a directory it owns; the only completion signal
//! is the file name. Firefox and Chromium both write to a temporary suffix
//! and rename once the transfer ends.
//!
//! The directory may be shared by concurrent runs, so a run only accepts
//! files that appeared after its own click: see [`DownloadBaseline`].

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::DownloadError;

/// Suffixes browsers use for transfers still in flight.
pub const IN_PROGRESS_SUFFIXES: &[&str] = &["part", "crdownload", "download", "partial", "tmp"];

/// File timestamps come from a coarser clock than [`SystemTime::now`].
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// True when `path` names a download that has not finished yet.
#[must_use]
pub fn is_in_progress(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IN_PROGRESS_SUFFIXES
                .iter()
                .any(|suffix| ext.eq_ignore_ascii_case(suffix))
        })
}

/// Lists the regular files in `dir` with their mtimes.
///
/// # Errors
///
/// Returns the IO error of the directory listing. Entries that vanish while
/// being inspected are skipped.
pub fn list_files_blocking(dir: &Path) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        files.push((entry.path(), modified));
    }
    Ok(files)
}

/// Returns the most recently modified regular file in `dir` with its mtime.
///
/// # Errors
///
/// Returns the IO error of the directory listing.
pub fn newest_file_blocking(dir: &Path) -> io::Result<Option<(PathBuf, SystemTime)>> {
    Ok(list_files_blocking(dir)?
        .into_iter()
        .max_by_key(|(_, modified)| *modified))
}

/// Directory contents recorded just before a download click.
///
/// Only files whose names were absent from the snapshot and whose mtime is
/// not older than the snapshot count as this run's download.
#[derive(Debug, Clone)]
pub struct DownloadBaseline {
    taken_at: SystemTime,
    existing: HashSet<PathBuf>,
}

impl DownloadBaseline {
    /// Creates a baseline from a snapshot time and the names present then.
    #[must_use]
    pub fn new(taken_at: SystemTime, existing: HashSet<PathBuf>) -> Self {
        Self { taken_at, existing }
    }

    /// When the snapshot was taken.
    #[must_use]
    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    /// True when `path` may belong to the download started after the snapshot.
    #[must_use]
    pub fn admits(&self, path: &Path, modified: SystemTime) -> bool {
        let floor = self.taken_at.checked_sub(MTIME_SLACK).unwrap_or(self.taken_at);
        !self.existing.contains(path) && modified >= floor
    }

    fn newest_admitted(&self, files: Vec<(PathBuf, SystemTime)>) -> Option<(PathBuf, SystemTime)> {
        files
            .into_iter()
            .filter(|(path, modified)| self.admits(path, *modified))
            .max_by_key(|(_, modified)| *modified)
    }
}

/// Polls a directory until a finished download shows up.
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    dir: PathBuf,
    staleness: Duration,
    poll_interval: Duration,
}

impl DownloadWatcher {
    /// Creates a watcher for `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, staleness: Duration, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            staleness,
            poll_interval,
        }
    }

    /// Watched directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn list_files(&self) -> Result<Vec<(PathBuf, SystemTime)>, DownloadError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || list_files_blocking(&dir))
            .await
            .map_err(|e| DownloadError::Panicked {
                message: format!("directory scan task failed: {e}"),
            })?
            .map_err(|e| DownloadError::io(&self.dir, e))
    }

    /// Records the directory contents; call right before the download click.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the directory cannot be listed.
    pub async fn baseline(&self) -> Result<DownloadBaseline, DownloadError> {
        let taken_at = SystemTime::now();
        let existing = self
            .list_files()
            .await?
            .into_iter()
            .map(|(path, _)| path)
            .collect::<HashSet<_>>();
        debug!(existing = existing.len(), "download directory baseline");
        Ok(DownloadBaseline::new(taken_at, existing))
    }

    /// Waits for the newest file admitted by `baseline` to be a finished,
    /// fresh download.
    ///
    /// A file qualifies when its name carries no in-progress suffix and it
    /// was modified within the staleness bound. Waiting stops once the bound
    /// itself has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::FileNotFound`] when nothing qualifies in time.
    #[tracing::instrument(skip_all, fields(dir = %self.dir.display()))]
    pub async fn wait_for_completed_file(
        &self,
        baseline: &DownloadBaseline,
    ) -> Result<PathBuf, DownloadError> {
        let started = Instant::now();
        loop {
            match self.list_files().await {
                Ok(files) => match baseline.newest_admitted(files) {
                    Some((path, modified)) => {
                        let age = SystemTime::now()
                            .duration_since(modified)
                            .unwrap_or(Duration::ZERO);
                        if is_in_progress(&path) {
                            debug!(file = %path.display(), "download still in progress");
                        } else if age > self.staleness {
                            debug!(file = %path.display(), age_secs = age.as_secs(), "newest file is stale");
                        } else {
                            info!(file = %path.display(), "download finished");
                            return Ok(path);
                        }
                    }
                    None => debug!("no new file in the download directory"),
                },
                Err(error) => warn!(%error, "download directory scan failed"),
            }

            if started.elapsed() >= self.staleness {
                return Err(DownloadError::FileNotFound {
                    dir: self.dir.clone(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

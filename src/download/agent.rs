//! Retrieval agent: drives a browser session through a mirror download page.
//!
//! Mirror pages are ad-laden. A click on the download control is often
//! swallowed by an overlay, or opens a popup window or alert instead of
//! starting the transfer. The agent runs a small state machine:
//!
//! ```text
//! Navigating -> Clicking -> WaitingForFile -> Done
//!                  |  ^
//!                  v  |
//!            Intercepted -> Recovering     (at most `click_attempts` times)
//!                  |
//!                  v
//!             ScriptClick -> WaitingForFile
//! ```
//!
//! The browser session is closed exactly once on every exit path. The
//! download directory is snapshotted before navigation, so a file another
//! run left behind is never mistaken for this run's download.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::browser::{BrowserError, BrowserLauncher, BrowserSession};
use super::watcher::DownloadWatcher;
use super::DownloadError;
use crate::config::PipelineConfig;

/// Clicks the first node matching `arguments[0]`; returns whether one existed.
const SCRIPT_CLICK: &str = "var node = document.evaluate(arguments[0], document, null, \
    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue; \
    if (!node) { return false; } node.click(); return true;";

/// States of one retrieval run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Opening the download page.
    Navigating,
    /// Locating and clicking the download control.
    Clicking,
    /// A click failed because something covered or replaced the control.
    Intercepted,
    /// Closing popups and alerts before the next click.
    Recovering,
    /// Last resort: clicking from page script.
    ScriptClick,
    /// Watching the download directory.
    WaitingForFile,
    /// A finished file was found.
    Done,
    /// The run ended without a file.
    Failed,
}

/// Drives a browser to download a verified link into the watched directory.
pub struct RetrievalAgent {
    launcher: Arc<dyn BrowserLauncher>,
    button_xpath: String,
    click_attempts: u32,
    recovery_pause: Duration,
    watcher: DownloadWatcher,
}

impl RetrievalAgent {
    /// Creates an agent using the locator, retry ceiling and timings in `config`.
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &PipelineConfig) -> Self {
        Self {
            launcher,
            button_xpath: config.download_button_xpath.clone(),
            click_attempts: config.click_attempts,
            recovery_pause: config.recovery_pause,
            watcher: DownloadWatcher::new(
                config.download_dir.clone(),
                config.download_staleness,
                config.poll_interval,
            ),
        }
    }

    /// Downloads the file behind `link_url` and returns its path.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Launch`] when no browser session could be started.
    /// - [`DownloadError::Navigation`] when the page could not be opened.
    /// - [`DownloadError::ElementNotFound`] when every click attempt failed.
    /// - [`DownloadError::FileNotFound`] when no finished file appeared.
    /// - [`DownloadError::Panicked`] when driving the session panicked.
    #[instrument(skip_all, fields(url = %link_url))]
    pub async fn retrieve(&self, link_url: &str) -> Result<PathBuf, DownloadError> {
        let mut session = self
            .launcher
            .launch()
            .await
            .map_err(|source| DownloadError::Launch { source })?;

        let outcome = AssertUnwindSafe(self.drive(session.as_mut(), link_url))
            .catch_unwind()
            .await;

        if let Err(error) = session.close().await {
            warn!(%error, "closing browser session failed");
        }

        let result = outcome.unwrap_or_else(|payload| {
            Err(DownloadError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        });
        match &result {
            Ok(path) => info!(state = ?AgentState::Done, file = %path.display(), "retrieval finished"),
            Err(error) => warn!(state = ?AgentState::Failed, %error, "retrieval failed"),
        }
        result
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        link_url: &str,
    ) -> Result<PathBuf, DownloadError> {
        let baseline = self.watcher.baseline().await?;
        let mut state = AgentState::Navigating;
        let mut recoveries = 0_u32;
        let mut clicks = 0_u32;
        let mut original_window = None;
        let mut last_failure = String::new();

        loop {
            debug!(?state, recoveries, "agent state");
            state = match state {
                AgentState::Navigating => {
                    session
                        .navigate(link_url)
                        .await
                        .map_err(|e| DownloadError::navigation(link_url, e))?;
                    original_window = download_window(session).await;
                    AgentState::Clicking
                }
                AgentState::Clicking => {
                    clicks += 1;
                    match self.click_download(session).await {
                        Ok(()) => AgentState::WaitingForFile,
                        Err(error) if error.is_recoverable_click_failure() => {
                            debug!(%error, "download click failed");
                            last_failure = error.to_string();
                            AgentState::Intercepted
                        }
                        Err(error @ BrowserError::Transport { .. }) => {
                            return Err(DownloadError::navigation(link_url, error));
                        }
                        Err(error) => {
                            return Err(DownloadError::element_not_found(
                                &self.button_xpath,
                                clicks,
                                error.to_string(),
                            ));
                        }
                    }
                }
                AgentState::Intercepted => {
                    if recoveries < self.click_attempts {
                        recoveries += 1;
                        AgentState::Recovering
                    } else {
                        AgentState::ScriptClick
                    }
                }
                AgentState::Recovering => {
                    self.recover(session, original_window.as_deref()).await;
                    AgentState::Clicking
                }
                AgentState::ScriptClick => {
                    clicks += 1;
                    let clicked = session
                        .execute_script(SCRIPT_CLICK, vec![json!(self.button_xpath)])
                        .await;
                    match clicked {
                        Ok(value) if value.as_bool() == Some(true) => {
                            info!("download started by script click");
                            AgentState::WaitingForFile
                        }
                        Ok(_) => {
                            return Err(DownloadError::element_not_found(
                                &self.button_xpath,
                                clicks,
                                last_failure,
                            ));
                        }
                        Err(error) => {
                            return Err(DownloadError::element_not_found(
                                &self.button_xpath,
                                clicks,
                                error.to_string(),
                            ));
                        }
                    }
                }
                AgentState::WaitingForFile => {
                    return self.watcher.wait_for_completed_file(&baseline).await;
                }
                AgentState::Done | AgentState::Failed => {
                    return Err(DownloadError::Panicked {
                        message: format!("agent loop entered terminal state {state:?}"),
                    });
                }
            };
        }
    }

    async fn click_download(&self, session: &mut dyn BrowserSession) -> Result<(), BrowserError> {
        let element = session.find_element(&self.button_xpath).await?;
        session.click(&element).await
    }

    /// Dismisses any alert and closes every window except `original`.
    ///
    /// Cleanup errors are logged and ignored; the next click attempt decides.
    async fn recover(&self, session: &mut dyn BrowserSession, original: Option<&str>) {
        match session.dismiss_alert().await {
            Ok(()) => debug!("dismissed alert"),
            Err(BrowserError::NoSuchAlert) => {}
            Err(error) => debug!(%error, "alert dismissal failed"),
        }

        if let Some(original) = original {
            match session.window_handles().await {
                Ok(handles) => {
                    for handle in handles.iter().filter(|h| h.as_str() != original) {
                        let closed = match session.switch_to_window(handle).await {
                            Ok(()) => session.close_window().await,
                            Err(error) => Err(error),
                        };
                        match closed {
                            Ok(()) => debug!(handle, "closed popup window"),
                            Err(error) => debug!(handle, %error, "popup close failed"),
                        }
                    }
                }
                Err(error) => debug!(%error, "listing windows failed"),
            }
            if let Err(error) = session.switch_to_window(original).await {
                debug!(%error, "switching back to the download page failed");
            }
        }

        tokio::time::sleep(self.recovery_pause).await;
    }
}

/// Handle of the window showing the download page.
///
/// Falls back to the first open window; without any handle popups are left
/// open during recovery.
async fn download_window(session: &mut dyn BrowserSession) -> Option<String> {
    match session.current_window().await {
        Ok(handle) => return Some(handle),
        Err(error) => warn!(%error, "reading the current window failed, using the first window"),
    }
    match session.window_handles().await {
        Ok(handles) => handles.into_iter().next(),
        Err(error) => {
            warn!(%error, "listing windows failed, popups will not be closed");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_from_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(boxed.as_ref()), "kaboom");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}

//! Chromium sessions over the DevTools protocol (chromiumoxide).
//!
//! Every session is its own browser process with a throwaway profile.
//! Downloads are routed into the configured directory through
//! `Browser.setDownloadBehavior`; Chromium writes `.crdownload` files while a
//! transfer runs and renames them once it ends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::HandleJavaScriptDialogParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::browser::{BrowserError, BrowserLauncher, BrowserSession, ElementHandle};
use crate::config::PipelineConfig;

/// Page loads on slow mirrors can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Executable names searched on `PATH` when no browser path is configured.
const CHROMIUM_NAMES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

const LAUNCH_ARGS: &[&str] = &[
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
];

/// Returns the tag of the node on top of the element's centre, or null when
/// the element itself (or one of its children) would receive a click.
const COVERING_NODE_FN: &str = "function() { \
    const box = this.getBoundingClientRect(); \
    const top = document.elementFromPoint(box.left + box.width / 2, box.top + box.height / 2); \
    if (!top || top === this || this.contains(top)) { return null; } \
    return top.tagName.toLowerCase() + (top.id ? '#' + top.id : ''); }";

static PROFILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Resolves the Chromium executable.
///
/// A configured path must exist; otherwise the usual executable names are
/// looked up on `PATH`.
///
/// # Errors
///
/// Returns [`BrowserError::Transport`] when no executable is available.
pub fn find_chromium(configured: Option<&Path>) -> Result<PathBuf, BrowserError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(BrowserError::Transport {
            reason: format!("browser executable {} does not exist", path.display()),
        });
    }
    CHROMIUM_NAMES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| BrowserError::Transport {
            reason: format!("none of {} found on PATH; set `browser_path`", CHROMIUM_NAMES.join(", ")),
        })
}

/// Wraps a script body taking `arguments[n]` into an expression applying it
/// to `args`.
pub(crate) fn script_call(script: &str, args: &[Value]) -> Result<String, BrowserError> {
    let args = serde_json::to_string(args).map_err(|e| BrowserError::Protocol {
        reason: format!("script arguments are not serializable: {e}"),
    })?;
    Ok(format!("(function() {{ {script} }}).apply(null, {args})"))
}

fn from_cdp(error: CdpError) -> BrowserError {
    match error {
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::NoResponse | CdpError::Timeout => {
            BrowserError::Transport {
                reason: error.to_string(),
            }
        }
        other => BrowserError::Command {
            code: "cdp".to_string(),
            message: other.to_string(),
        },
    }
}

/// Lookup failures other than a dead connection mean the node is absent.
fn locate_error(xpath: &str, error: CdpError) -> BrowserError {
    match from_cdp(error) {
        transport @ BrowserError::Transport { .. } => transport,
        _ => BrowserError::NoSuchElement {
            locator: xpath.to_string(),
        },
    }
}

fn window_handle(page: &Page) -> String {
    page.target_id().inner().clone()
}

fn browser_config(executable: PathBuf, profile: &Path, headless: bool) -> Result<BrowserConfig, BrowserError> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(executable)
        .user_data_dir(profile)
        .request_timeout(REQUEST_TIMEOUT);
    if !headless {
        builder = builder.with_head();
    }
    for arg in LAUNCH_ARGS {
        builder = builder.arg(*arg);
    }
    builder
        .build()
        .map_err(|reason| BrowserError::Protocol { reason })
}

/// Starts one Chromium process per retrieval.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    download_dir: PathBuf,
    headless: bool,
}

impl ChromiumLauncher {
    /// Creates a launcher for the executable, directory and mode in `config`.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            executable: config.browser_path.clone(),
            download_dir: config.download_dir.clone(),
            headless: config.headless,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let executable = find_chromium(self.executable.as_deref())?;
        let profile = std::env::temp_dir().join(format!(
            "bookrelay-profile-{}-{}",
            std::process::id(),
            PROFILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let config = browser_config(executable, &profile, self.headless)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Transport {
                reason: format!("failed to launch Chromium: {e}"),
            })?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    debug!(%error, "browser event error");
                }
            }
        });

        match open_download_page(&browser, &self.download_dir).await {
            Ok(page) => {
                info!(
                    headless = self.headless,
                    download_dir = %self.download_dir.display(),
                    "browser session started"
                );
                Ok(Box::new(ChromiumSession {
                    browser,
                    events,
                    page,
                    profile,
                }))
            }
            Err(error) => {
                shutdown(browser, events, &profile).await;
                Err(error)
            }
        }
    }
}

async fn open_download_page(browser: &Browser, download_dir: &Path) -> Result<Page, BrowserError> {
    let behavior = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(download_dir.display().to_string())
        .build()
        .map_err(|reason| BrowserError::Protocol { reason })?;
    browser.execute(behavior).await.map_err(from_cdp)?;
    browser.new_page("about:blank").await.map_err(from_cdp)
}

/// Closes the browser, stops its event loop and removes the profile.
///
/// Returns the close command's error, if any; cleanup always runs.
async fn shutdown(mut browser: Browser, events: JoinHandle<()>, profile: &Path) -> Option<BrowserError> {
    let closed = browser.close().await.err().map(from_cdp);
    if let Err(error) = browser.wait().await {
        debug!(%error, "waiting for browser exit failed");
    }
    events.abort();
    if let Err(error) = tokio::fs::remove_dir_all(profile).await {
        debug!(%error, profile = %profile.display(), "profile cleanup failed");
    }
    closed
}

/// A running Chromium process focused on one page target.
pub struct ChromiumSession {
    browser: Browser,
    events: JoinHandle<()>,
    page: Page,
    profile: PathBuf,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await.map_err(from_cdp)?;
        Ok(())
    }

    async fn find_element(&mut self, xpath: &str) -> Result<ElementHandle, BrowserError> {
        self.page
            .find_xpath(xpath)
            .await
            .map_err(|e| locate_error(xpath, e))?;
        Ok(ElementHandle(xpath.to_string()))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), BrowserError> {
        let xpath = element.0.as_str();
        let node = self
            .page
            .find_xpath(xpath)
            .await
            .map_err(|e| locate_error(xpath, e))?;
        node.scroll_into_view().await.map_err(from_cdp)?;

        let covering = node
            .call_js_fn(COVERING_NODE_FN, false)
            .await
            .map_err(from_cdp)?;
        if let Some(Value::String(cover)) = covering.result.value {
            return Err(BrowserError::ClickIntercepted {
                message: format!("{cover} would receive the click on {xpath}"),
            });
        }

        node.click().await.map_err(from_cdp)?;
        Ok(())
    }

    async fn window_handles(&mut self) -> Result<Vec<String>, BrowserError> {
        let pages = self.browser.pages().await.map_err(from_cdp)?;
        Ok(pages.iter().map(window_handle).collect())
    }

    async fn current_window(&mut self) -> Result<String, BrowserError> {
        Ok(window_handle(&self.page))
    }

    async fn switch_to_window(&mut self, handle: &str) -> Result<(), BrowserError> {
        let pages = self.browser.pages().await.map_err(from_cdp)?;
        let page = pages
            .into_iter()
            .find(|page| window_handle(page) == handle)
            .ok_or_else(|| BrowserError::Command {
                code: "no such window".to_string(),
                message: handle.to_string(),
            })?;
        page.bring_to_front().await.map_err(from_cdp)?;
        self.page = page;
        Ok(())
    }

    async fn close_window(&mut self) -> Result<(), BrowserError> {
        self.page.clone().close().await.map_err(from_cdp)
    }

    async fn dismiss_alert(&mut self) -> Result<(), BrowserError> {
        match self.page.execute(HandleJavaScriptDialogParams::new(false)).await {
            Ok(_) => Ok(()),
            Err(error) => match from_cdp(error) {
                transport @ BrowserError::Transport { .. } => Err(transport),
                _ => Err(BrowserError::NoSuchAlert),
            },
        }
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        let call = script_call(script, &args)?;
        let result = self.page.evaluate(call).await.map_err(from_cdp)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        let Self {
            browser,
            events,
            page: _,
            profile,
        } = *self;
        match shutdown(browser, events, &profile).await {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_call_applies_arguments() {
        let call = script_call("return arguments[0] + arguments[1];", &[json!("a"), json!(2)]).unwrap();
        assert_eq!(call, "(function() { return arguments[0] + arguments[1]; }).apply(null, [\"a\",2])");
    }

    #[test]
    fn test_script_call_escapes_quotes_in_arguments() {
        let call = script_call("return arguments[0];", &[json!("//a[@id=\"x\"]")]).unwrap();
        assert!(call.ends_with(r#".apply(null, ["//a[@id=\"x\"]"])"#), "{call}");
    }

    #[test]
    fn test_find_chromium_rejects_missing_configured_path() {
        let err = find_chromium(Some(Path::new("/nonexistent/bookrelay/chromium"))).unwrap_err();
        assert!(matches!(err, BrowserError::Transport { .. }), "got {err:?}");
        assert!(err.to_string().contains("/nonexistent/bookrelay/chromium"));
    }

    #[test]
    fn test_find_chromium_accepts_existing_configured_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(find_chromium(Some(file.path())).unwrap(), file.path());
    }

    #[test]
    fn test_browser_config_builds_for_both_modes() {
        let profile = std::env::temp_dir().join("bookrelay-profile-config-test");
        assert!(browser_config(PathBuf::from("/usr/bin/chromium"), &profile, true).is_ok());
        assert!(browser_config(PathBuf::from("/usr/bin/chromium"), &profile, false).is_ok());
    }

    #[test]
    fn test_locate_error_keeps_transport_failures() {
        let err = locate_error("//a", CdpError::NoResponse);
        assert!(matches!(err, BrowserError::Transport { .. }), "got {err:?}");
        let err = locate_error("//a", CdpError::NotFound);
        assert!(matches!(err, BrowserError::NoSuchElement { ref locator } if locator == "//a"), "got {err:?}");
    }
}

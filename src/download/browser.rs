//! Browser session abstraction used by the retrieval agent.
//!
//! The agent only needs a handful of page operations. Keeping them behind a
//! trait lets the agent's recovery logic be driven by a scripted fake in
//! tests and by a Chromium session in production.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a browser session.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// No element matched the locator.
    #[error("no element matches {locator}")]
    NoSuchElement {
        /// Locator that matched nothing.
        locator: String,
    },

    /// Another element (an ad overlay, a popup) received the click.
    #[error("click intercepted: {message}")]
    ClickIntercepted {
        /// What received the click instead.
        message: String,
    },

    /// No alert was open to dismiss.
    #[error("no open alert")]
    NoSuchAlert,

    /// Any other command failure reported by the browser.
    #[error("{code}: {message}")]
    Command {
        /// Error code or protocol name.
        code: String,
        /// Browser message.
        message: String,
    },

    /// The browser could not be started or reached.
    #[error("browser unreachable: {reason}")]
    Transport {
        /// Failure description.
        reason: String,
    },

    /// A request could not be built or its answer made no sense.
    #[error("unexpected browser response: {reason}")]
    Protocol {
        /// What was wrong with the response.
        reason: String,
    },
}

impl BrowserError {
    /// True when an overlay or a missing element blocked the click, which
    /// a popup cleanup may fix.
    #[must_use]
    pub fn is_recoverable_click_failure(&self) -> bool {
        matches!(self, Self::ClickIntercepted { .. } | Self::NoSuchElement { .. })
    }
}

/// Opaque reference to an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// One automated browser window set.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates the current window to `url`.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    /// Finds the first element matching an XPath expression.
    async fn find_element(&mut self, xpath: &str) -> Result<ElementHandle, BrowserError>;
    /// Clicks an element.
    async fn click(&mut self, element: &ElementHandle) -> Result<(), BrowserError>;
    /// Lists all open window handles.
    async fn window_handles(&mut self) -> Result<Vec<String>, BrowserError>;
    /// Returns the handle of the focused window.
    async fn current_window(&mut self) -> Result<String, BrowserError>;
    /// Focuses a window.
    async fn switch_to_window(&mut self, handle: &str) -> Result<(), BrowserError>;
    /// Closes the focused window.
    async fn close_window(&mut self) -> Result<(), BrowserError>;
    /// Dismisses an open alert.
    async fn dismiss_alert(&mut self) -> Result<(), BrowserError>;
    /// Runs a script in the page with positional arguments.
    async fn execute_script(
        &mut self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, BrowserError>;
    /// Ends the session and releases the browser.
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Starts a new session.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

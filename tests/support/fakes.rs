//! Scripted stand-ins for the browser and mail transport.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bookrelay_core::{
    BrowserError, BrowserLauncher, BrowserSession, ElementHandle, MailError, MailTransport,
    OutgoingMail,
};
use serde_json::Value;

/// A file the fake browser "downloads" once a click lands.
#[derive(Debug, Clone)]
pub struct PlannedDownload {
    pub dir: PathBuf,
    pub filename: String,
    /// Time the file spends with a `.part` suffix before its final rename.
    pub finish_after: Duration,
}

/// How the fake browser behaves.
#[derive(Debug, Clone, Default)]
pub struct BrowserScript {
    pub fail_launch: bool,
    pub navigate_error: Option<BrowserError>,
    pub panic_on_navigate: bool,
    /// Reading the focused window fails.
    pub current_window_error: bool,
    /// Number of regular clicks intercepted before one succeeds.
    pub intercepted_clicks: u32,
    /// Value the script-level click returns.
    pub script_click_finds_node: bool,
    /// Extra windows (popups) open next to the download page.
    pub popups: Vec<String>,
    pub download: Option<PlannedDownload>,
}

/// Everything the fake browser was asked to do.
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub launches: u32,
    pub navigations: Vec<String>,
    pub clicks: u32,
    pub alert_dismissals: u32,
    pub script_clicks: u32,
    pub closed_windows: Vec<String>,
    pub session_closes: u32,
}

#[derive(Clone)]
pub struct FakeLauncher {
    pub script: BrowserScript,
    pub log: Arc<Mutex<BrowserLog>>,
}

impl FakeLauncher {
    pub fn new(script: BrowserScript) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(BrowserLog::default())),
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, BrowserLog> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.log.lock().unwrap().launches += 1;
        if self.script.fail_launch {
            return Err(BrowserError::Transport {
                reason: "connection refused".into(),
            });
        }
        let mut handles = vec!["main".to_string()];
        handles.extend(self.script.popups.iter().cloned());
        Ok(Box::new(FakeBrowser {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            handles,
            current: "main".to_string(),
            intercepted_left: self.script.intercepted_clicks,
        }))
    }
}

struct FakeBrowser {
    script: BrowserScript,
    log: Arc<Mutex<BrowserLog>>,
    handles: Vec<String>,
    current: String,
    intercepted_left: u32,
}

impl FakeBrowser {
    fn start_download(&self) {
        let Some(plan) = self.script.download.clone() else {
            return;
        };
        let final_path = plan.dir.join(&plan.filename);
        let part_path = plan.dir.join(format!("{}.part", plan.filename));
        if plan.finish_after.is_zero() {
            std::fs::write(&final_path, b"epub bytes").unwrap();
            return;
        }
        std::fs::write(&part_path, b"epub by").unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(plan.finish_after).await;
            std::fs::rename(&part_path, &final_path).unwrap();
        });
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        assert!(!self.script.panic_on_navigate, "browser crashed");
        self.log.lock().unwrap().navigations.push(url.to_string());
        match &self.script.navigate_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn find_element(&mut self, xpath: &str) -> Result<ElementHandle, BrowserError> {
        Ok(ElementHandle(format!("el:{xpath}")))
    }

    async fn click(&mut self, _element: &ElementHandle) -> Result<(), BrowserError> {
        self.log.lock().unwrap().clicks += 1;
        if self.intercepted_left > 0 {
            self.intercepted_left -= 1;
            return Err(BrowserError::ClickIntercepted {
                message: "div.ad-overlay receives the click".into(),
            });
        }
        self.start_download();
        Ok(())
    }

    async fn window_handles(&mut self) -> Result<Vec<String>, BrowserError> {
        Ok(self.handles.clone())
    }

    async fn current_window(&mut self) -> Result<String, BrowserError> {
        if self.script.current_window_error {
            return Err(BrowserError::Command {
                code: "unknown error".into(),
                message: "target detached".into(),
            });
        }
        Ok(self.current.clone())
    }

    async fn switch_to_window(&mut self, handle: &str) -> Result<(), BrowserError> {
        if !self.handles.iter().any(|h| h == handle) {
            return Err(BrowserError::Command {
                code: "no such window".into(),
                message: handle.into(),
            });
        }
        self.current = handle.to_string();
        Ok(())
    }

    async fn close_window(&mut self) -> Result<(), BrowserError> {
        let current = self.current.clone();
        self.handles.retain(|h| *h != current);
        self.log.lock().unwrap().closed_windows.push(current);
        Ok(())
    }

    async fn dismiss_alert(&mut self) -> Result<(), BrowserError> {
        self.log.lock().unwrap().alert_dismissals += 1;
        Err(BrowserError::NoSuchAlert)
    }

    async fn execute_script(&mut self, _script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        assert_eq!(args.len(), 1, "script click takes the locator");
        self.log.lock().unwrap().script_clicks += 1;
        if self.script.script_click_finds_node {
            self.start_download();
        }
        Ok(Value::Bool(self.script.script_click_finds_node))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.log.lock().unwrap().session_closes += 1;
        Ok(())
    }
}

/// Mail transport that records messages, or fails every send.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutgoingMail>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport {
                reason: "535 authentication failed".into(),
            });
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

//! Pipeline configuration.
//!
//! [`PipelineConfig`] is built once at process start (defaults, then config
//! file, environment and CLI overrides in the binary) and handed to every
//! component by reference. Pipeline code never reads settings from globals.

use std::path::PathBuf;
use std::time::Duration;

/// Default mirror endpoints, in priority order.
pub const DEFAULT_MIRRORS: [&str; 8] = [
    "https://libgen.is",
    "https://libgen.st",
    "https://libgen.bz",
    "https://libgen.gs",
    "https://libgen.la",
    "https://libgen.gl",
    "https://libgen.li",
    "https://libgen.rs",
];

/// Default metadata index used for record hash search.
pub const DEFAULT_METADATA_INDEX_URL: &str = "https://annas-archive.org";

/// Default paid API base URL used by the fallback retriever.
pub const DEFAULT_PAID_API_URL: &str = "https://annas-archive.org";

/// Structural path of the download button on mirror `get.php` pages.
pub const DEFAULT_DOWNLOAD_BUTTON_XPATH: &str = "/html/body/table/tbody/tr[1]/td[2]/a";

/// Default number of interception recoveries before the script-level click.
pub const DEFAULT_CLICK_ATTEMPTS: u32 = 3;

/// Default per-probe timeout (5 seconds).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default staleness bound on the download directory (10 minutes).
pub const DEFAULT_DOWNLOAD_STALENESS: Duration = Duration::from_secs(10 * 60);

/// Default interval between download directory polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default pause after closing popups, before clicking again.
pub const DEFAULT_RECOVERY_PAUSE: Duration = Duration::from_millis(500);

/// Configuration for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Mirror base URLs in static priority order.
    pub mirrors: Vec<String>,
    /// Metadata index base URL (search + record hash anchors).
    pub metadata_index_url: String,
    /// File format filter for the metadata index search.
    pub search_format: String,
    /// Language filters for the metadata index search.
    pub search_languages: Vec<String>,
    /// Paid API base URL.
    pub paid_api_url: String,
    /// Directory the browser saves downloads into.
    pub download_dir: PathBuf,
    /// Structural path of the download button.
    pub download_button_xpath: String,
    /// Interception recoveries allowed before the script-level click.
    pub click_attempts: u32,
    /// Timeout applied to each mirror/link probe.
    pub probe_timeout: Duration,
    /// How long a completed download may take to appear (and how old it may be).
    pub download_staleness: Duration,
    /// Download directory poll interval.
    pub poll_interval: Duration,
    /// Pause after popup recovery.
    pub recovery_pause: Duration,
    /// Chromium executable; searched on `PATH` when unset.
    pub browser_path: Option<PathBuf>,
    /// Launch the browser without a visible window.
    pub headless: bool,
    /// Sender mailbox for deliveries.
    pub mail_account: String,
    /// SMTP relay host.
    pub smtp_host: String,
    /// Subject line of delivery mails.
    pub mail_subject: String,
    /// Use the paid API when the agent fails on a verified, live link.
    pub fallback_on_extraction_failure: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_MIRRORS.iter().map(ToString::to_string).collect(),
            metadata_index_url: DEFAULT_METADATA_INDEX_URL.to_string(),
            search_format: "epub".to_string(),
            search_languages: vec!["en".to_string(), "he".to_string()],
            paid_api_url: DEFAULT_PAID_API_URL.to_string(),
            download_dir: PathBuf::from("/tmp/ebooks"),
            download_button_xpath: DEFAULT_DOWNLOAD_BUTTON_XPATH.to_string(),
            click_attempts: DEFAULT_CLICK_ATTEMPTS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            download_staleness: DEFAULT_DOWNLOAD_STALENESS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recovery_pause: DEFAULT_RECOVERY_PAUSE,
            browser_path: None,
            headless: true,
            mail_account: String::new(),
            smtp_host: "smtp.gmail.com".to_string(),
            mail_subject: "book".to_string(),
            fallback_on_extraction_failure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_known_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.mirrors.len(), 8);
        assert_eq!(config.mirrors[0], "https://libgen.is");
        assert_eq!(config.click_attempts, 3);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.download_staleness, Duration::from_secs(600));
        assert!(!config.fallback_on_extraction_failure);
    }
}

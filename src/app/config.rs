//! Settings loading: defaults, then the config file, then environment.
//!
//! The file uses a flat `key = value` syntax (a TOML subset): strings are
//! double-quoted, lists are `["a", "b"]`, booleans are `true`/`false`, and
//! `#` starts a comment outside strings.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bookrelay_core::PipelineConfig;
use bookrelay_core::secrets::BitwardenItems;

/// Where secrets come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SecretSource {
    /// `BOOKRELAY_*` environment variables.
    Env,
    /// Bitwarden vault through the `bw` CLI.
    Bitwarden,
}

impl SecretSource {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "env" => Ok(Self::Env),
            "bitwarden" => Ok(Self::Bitwarden),
            other => bail!("Expected 'env' or 'bitwarden', got '{other}'"),
        }
    }
}

/// Everything the binary needs to build and serve the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct AppSettings {
    pub(crate) pipeline: PipelineConfig,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) log_path: Option<PathBuf>,
    pub(crate) secret_source: SecretSource,
    pub(crate) bitwarden: BitwardenItems,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            host: "0.0.0.0".to_string(),
            port: 19191,
            log_path: None,
            secret_source: SecretSource::Env,
            bitwarden: BitwardenItems::default(),
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookrelay/config.toml`
/// 2. `$HOME/.config/bookrelay/config.toml`
#[must_use]
pub(crate) fn default_config_path() -> Option<PathBuf> {
    let non_empty = |name: &str| env::var_os(name).filter(|v: &OsString| !v.is_empty());
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("bookrelay").join("config.toml"));
    }
    non_empty("HOME").map(|home| PathBuf::from(home).join(".config").join("bookrelay").join("config.toml"))
}

/// Loads settings from `explicit` (must exist) or the default path (optional),
/// then applies environment overrides.
pub(crate) fn load_settings(explicit: Option<&Path>) -> Result<AppSettings> {
    let mut settings = AppSettings::default();
    match explicit {
        Some(path) => settings = load_file(path, settings)?,
        None => {
            if let Some(path) = default_config_path().filter(|p| p.exists()) {
                settings = load_file(&path, settings)?;
            }
        }
    }
    apply_env_overrides(&mut settings, |name| env::var(name).ok())?;
    Ok(settings)
}

fn load_file(path: &Path, base: AppSettings) -> Result<AppSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_settings(&raw, base).with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Parses config text on top of `base`.
pub(crate) fn parse_settings(raw: &str, base: AppSettings) -> Result<AppSettings> {
    let mut s = base;
    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let (key, value) = (key.trim(), value.trim());
        apply_key(&mut s, key, value).with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
    }
    Ok(s)
}

fn apply_key(s: &mut AppSettings, key: &str, value: &str) -> Result<()> {
    let p = &mut s.pipeline;
    match key {
        "mirrors" => p.mirrors = non_empty_list(parse_string_list(value)?)?,
        "metadata_index_url" => p.metadata_index_url = parse_url(value)?,
        "paid_api_url" => p.paid_api_url = parse_url(value)?,
        "search_format" => p.search_format = parse_string(value)?,
        "search_languages" => p.search_languages = parse_string_list(value)?,
        "download_dir" => p.download_dir = PathBuf::from(parse_string(value)?),
        "download_button_xpath" => p.download_button_xpath = parse_string(value)?,
        "click_attempts" => p.click_attempts = u32::try_from(parse_in_range(value, 0, 10)?)?,
        "probe_timeout_secs" => p.probe_timeout = Duration::from_secs(parse_in_range(value, 1, 60)?),
        "download_timeout_minutes" => {
            p.download_staleness = Duration::from_secs(parse_in_range(value, 1, 120)? * 60);
        }
        "browser_path" => p.browser_path = Some(PathBuf::from(parse_string(value)?)),
        "headless" => p.headless = parse_bool(value)?,
        "mail_account" => p.mail_account = parse_string(value)?,
        "smtp_host" => p.smtp_host = parse_string(value)?,
        "mail_subject" => p.mail_subject = parse_string(value)?,
        "fallback_on_extraction_failure" => p.fallback_on_extraction_failure = parse_bool(value)?,
        "host" => s.host = parse_string(value)?,
        "port" => s.port = u16::try_from(parse_in_range(value, 1, u64::from(u16::MAX))?)?,
        "log_path" => s.log_path = Some(PathBuf::from(parse_string(value)?)),
        "secret_source" => s.secret_source = SecretSource::parse(&parse_string(value)?)?,
        "bw_mail_password_item" => s.bitwarden.mail_password = parse_string(value)?,
        "bw_paid_api_key_item" => s.bitwarden.paid_api_key = parse_string(value)?,
        "bw_api_key_item" => s.bitwarden.api_key = parse_string(value)?,
        unknown => bail!("Unknown configuration key: '{unknown}'"),
    }
    Ok(())
}

/// Applies `BOOKRELAY_*` overrides read through `lookup`.
pub(crate) fn apply_env_overrides(
    s: &mut AppSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    if let Some(v) = read("BOOKRELAY_MAIL_ACCOUNT") {
        s.pipeline.mail_account = v;
    }
    if let Some(v) = read("BOOKRELAY_DOWNLOAD_DIR") {
        s.pipeline.download_dir = PathBuf::from(v);
    }
    if let Some(v) = read("BOOKRELAY_BROWSER_PATH") {
        s.pipeline.browser_path = Some(PathBuf::from(v));
    }
    if let Some(v) = read("BOOKRELAY_HOST") {
        s.host = v;
    }
    if let Some(v) = read("BOOKRELAY_PORT") {
        s.port = v
            .trim()
            .parse()
            .with_context(|| format!("Invalid BOOKRELAY_PORT '{v}'"))?;
    }
    if let Some(v) = read("BOOKRELAY_LOG_PATH") {
        s.log_path = Some(PathBuf::from(v));
    }
    if let Some(v) = read("BOOKRELAY_SECRET_SOURCE") {
        s.secret_source = SecretSource::parse(v.trim()).context("Invalid BOOKRELAY_SECRET_SOURCE")?;
    }
    Ok(())
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string(raw: &str) -> Result<String> {
    raw.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("Expected double-quoted string"))
}

fn parse_string_list(raw: &str) -> Result<Vec<String>> {
    let inner = raw
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| anyhow!("Expected a list like [\"a\", \"b\"]"))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_string)
        .collect()
}

fn non_empty_list(items: Vec<String>) -> Result<Vec<String>> {
    if items.is_empty() {
        bail!("Expected at least one entry");
    }
    Ok(items)
}

fn parse_url(raw: &str) -> Result<String> {
    let value = parse_string(raw)?;
    url::Url::parse(&value).with_context(|| format!("'{value}' is not a URL"))?;
    Ok(value)
}

fn parse_in_range(raw: &str, min: u64, max: u64) -> Result<u64> {
    let value: u64 = raw.parse().with_context(|| format!("Expected integer, got '{raw}'"))?;
    if !(min..=max).contains(&value) {
        bail!("{value} is out of range. Expected range: {min}..={max}");
    }
    Ok(value)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_settings_overrides_selected_fields() {
        let raw = r#"
            # mirrors first
            mirrors = ["https://libgen.li", "https://libgen.rs"]
            download_timeout_minutes = 5
            headless = false   # show the browser
            browser_path = "/usr/bin/chromium"
            mail_account = "me#1@example.com"
            port = 8080
            secret_source = "bitwarden"
        "#;
        let s = parse_settings(raw, AppSettings::default()).unwrap();
        assert_eq!(s.pipeline.mirrors, vec!["https://libgen.li", "https://libgen.rs"]);
        assert_eq!(s.pipeline.download_staleness, Duration::from_secs(300));
        assert!(!s.pipeline.headless);
        assert_eq!(s.pipeline.browser_path, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(s.pipeline.mail_account, "me#1@example.com");
        assert_eq!(s.port, 8080);
        assert_eq!(s.secret_source, SecretSource::Bitwarden);
        assert_eq!(s.pipeline.click_attempts, 3, "untouched keys keep defaults");
    }

    #[test]
    fn test_parse_settings_rejects_unknown_key() {
        let err = parse_settings("colour = \"blue\"", AppSettings::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown configuration key"), "{err:#}");
    }

    #[test]
    fn test_parse_settings_rejects_out_of_range() {
        let err = parse_settings("click_attempts = 50", AppSettings::default()).unwrap_err();
        assert!(format!("{err:#}").contains("line 1"), "{err:#}");
    }

    #[test]
    fn test_parse_settings_rejects_empty_mirror_list() {
        assert!(parse_settings("mirrors = []", AppSettings::default()).is_err());
    }

    #[test]
    fn test_parse_settings_rejects_missing_equals() {
        assert!(parse_settings("headless", AppSettings::default()).is_err());
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let mut s = parse_settings("port = 8080", AppSettings::default()).unwrap();
        let env: HashMap<&str, &str> = [
            ("BOOKRELAY_PORT", "9090"),
            ("BOOKRELAY_MAIL_ACCOUNT", "a@b.c"),
            ("BOOKRELAY_BROWSER_PATH", "/opt/chromium/chrome"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut s, |name| env.get(name).map(ToString::to_string)).unwrap();
        assert_eq!(s.port, 9090);
        assert_eq!(s.pipeline.mail_account, "a@b.c");
        assert_eq!(s.pipeline.browser_path, Some(PathBuf::from("/opt/chromium/chrome")));
    }

    #[test]
    fn test_env_override_bad_port_is_error() {
        let mut s = AppSettings::default();
        let result = apply_env_overrides(&mut s, |name| (name == "BOOKRELAY_PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_settings_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = load_settings(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_file_reads_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "download_dir = \"/srv/books\"\n").unwrap();
        let s = load_file(&path, AppSettings::default()).unwrap();
        assert_eq!(s.pipeline.download_dir, PathBuf::from("/srv/books"));
    }
}

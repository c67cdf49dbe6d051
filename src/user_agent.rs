//! Shared User-Agent string for probe, scrape and fallback HTTP clients.
//!
//! Single source for the UA format so all pipeline traffic stays consistent.

/// Browser-like User-Agent; mirror pages reject obvious tool traffic.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) \
    Gecko/20100101 Firefox/128.0";

/// Default User-Agent for pipeline requests (probes, scrapes, paid API).
#[must_use]
pub(crate) fn default_pipeline_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

//! Shared HTTP client construction policy for pipeline components.
//!
//! This module centralizes networking defaults so the prober, the scrapers
//! and the paid fallback stay consistent on timeout, user-agent, compression
//! and proxy compatibility.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::Client;
use reqwest::{ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

use crate::user_agent;

/// Default connect timeout for scrape and API requests.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-request timeout for scrape and API requests.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure to build an HTTP client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The builder rejected the configuration.
    #[error("HTTP client construction failed for {component}: {source}")]
    Build {
        /// Component the client was built for.
        component: String,
        /// Underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The builder panicked twice (system proxy lookup, then env fallback).
    #[error("HTTP client construction panicked for {component}")]
    Panicked {
        /// Component the client was built for.
        component: String,
    },
}

/// Builds a pipeline HTTP client with the default timeouts.
///
/// # Errors
///
/// Returns [`ClientBuildError`] when client construction fails.
pub(crate) fn build_http_client(component: &str) -> Result<Client, ClientBuildError> {
    build_http_client_with_timeout(component, CONNECT_TIMEOUT, READ_TIMEOUT)
}

/// Builds a pipeline HTTP client with explicit timeouts.
///
/// `component` is used only for error messages and logging.
///
/// # Errors
///
/// Returns [`ClientBuildError`] when client construction fails.
pub(crate) fn build_http_client_with_timeout(
    component: &str,
    connect_timeout: Duration,
    timeout: Duration,
) -> Result<Client, ClientBuildError> {
    match try_build_client(connect_timeout, timeout, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; keep env-proxy support while skipping that lookup.
            warn!(
                component,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(connect_timeout, timeout, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ClientBuildError::Panicked {
                    component: component.to_string(),
                }),
                Err(BuildClientFailure::Build(source)) => Err(ClientBuildError::Build {
                    component: component.to_string(),
                    source,
                }),
            }
        }
        Err(BuildClientFailure::Build(source)) => Err(ClientBuildError::Build {
            component: component.to_string(),
            source,
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    connect_timeout: Duration,
    timeout: Duration,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(connect_timeout, timeout);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(connect_timeout: Duration, timeout: Duration) -> ClientBuilder {
    Client::builder()
        .connect_timeout(connect_timeout.min(timeout))
        .timeout(timeout)
        .user_agent(user_agent::default_pipeline_user_agent())
        .cookie_store(true)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

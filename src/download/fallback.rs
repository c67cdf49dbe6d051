//! Paid API fallback retriever.
//!
//! Used when no mirror is reachable. The API trades a record hash and an
//! account key for a short-lived direct file URL; the file is then fetched
//! into memory and handed to delivery without touching the disk.

use reqwest::Client;
use reqwest::header::CONTENT_DISPOSITION;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::DownloadError;
use super::filename::attachment_filename;
use crate::config::PipelineConfig;
use crate::delivery::RetrievedArtifact;
use crate::resolver::RecordHash;
use crate::resolver::http_client::build_http_client;

const FAST_DOWNLOAD_PATH: &str = "/dyn/api/fast_download.json";

#[derive(Debug, Deserialize)]
struct FastDownloadResponse {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Fetches artifacts through the paid fast-download API.
#[derive(Debug, Clone)]
pub struct FallbackRetriever {
    client: Client,
    api_base: String,
    api_key: String,
}

impl FallbackRetriever {
    /// Creates a retriever for the API in `config`, authenticated by `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &PipelineConfig, api_key: impl Into<String>) -> Result<Self, DownloadError> {
        let client = build_http_client("fallback")
            .map_err(|e| DownloadError::http(&config.paid_api_url, e.to_string()))?;
        Ok(Self::with_client(client, &config.paid_api_url, api_key))
    }

    /// Creates a retriever around an existing client.
    #[must_use]
    pub fn with_client(client: Client, api_base: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn api_url(&self, hash: &RecordHash) -> Result<Url, DownloadError> {
        let endpoint = format!("{}{FAST_DOWNLOAD_PATH}", self.api_base);
        let mut url = Url::parse(&endpoint).map_err(|e| DownloadError::http(&endpoint, e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("md5", hash.as_str())
            .append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Obtains a direct URL for `hash` and downloads it into memory.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Http`] on transport failure or a non-success status.
    /// - [`DownloadError::MissingDownloadUrl`] when the API returns no URL.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn retrieve(&self, hash: &RecordHash) -> Result<RetrievedArtifact, DownloadError> {
        let api_url = self.api_url(hash)?;
        // The key is part of the query; never log or report the full URL.
        let endpoint = format!("{}{FAST_DOWNLOAD_PATH}", self.api_base);

        let response = self
            .client
            .get(api_url)
            .send()
            .await
            .map_err(|e| DownloadError::http(&endpoint, e.to_string()))?;
        let status = response.status();
        let body: FastDownloadResponse = response
            .json()
            .await
            .map_err(|e| DownloadError::http(&endpoint, format!("HTTP {status}, invalid JSON: {e}")))?;

        if !status.is_success() {
            let reason = body.error.unwrap_or_else(|| "no error detail".to_string());
            return Err(DownloadError::http(&endpoint, format!("HTTP {status}: {reason}")));
        }
        let download_url = body
            .download_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DownloadError::MissingDownloadUrl {
                hash: hash.to_string(),
            })?;
        debug!("paid API returned a download URL");

        let file_url =
            Url::parse(&download_url).map_err(|e| DownloadError::http(&download_url, e.to_string()))?;
        let response = self
            .client
            .get(file_url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::http(file_url.as_str(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(DownloadError::http(
                file_url.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }
        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::http(file_url.as_str(), e.to_string()))?;

        let filename = attachment_filename(disposition.as_deref(), &file_url, hash);
        info!(filename, size_kb = bytes.len() / 1024, "fetched artifact from paid API");
        Ok(RetrievedArtifact::InMemory {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_carries_hash_and_key() {
        let retriever = FallbackRetriever::with_client(Client::new(), "https://annas-archive.org/", "k3y");
        let url = retriever.api_url(&RecordHash::new("AA11")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://annas-archive.org/dyn/api/fast_download.json?md5=aa11&key=k3y"
        );
    }

    #[test]
    fn test_response_tolerates_null_download_url() {
        let body: FastDownloadResponse =
            serde_json::from_str(r#"{"download_url": null, "error": "Invalid md5"}"#).unwrap();
        assert!(body.download_url.is_none());
        assert_eq!(body.error.as_deref(), Some("Invalid md5"));
    }
}

//! HTTP trigger surface: `GET /?goodreads_url=..&kindle_mail=..&key=..`.
//!
//! One request runs one pipeline to completion; the response carries the
//! classified outcome as an HTTP status.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bookrelay_core::{Pipeline, PipelineError, ProgressReporter, redact_address};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

const SUCCESS_MESSAGE: &str = "success, check your inbox for confirmation";

/// Runs one acquisition; implemented by [`Pipeline`].
#[async_trait]
pub(crate) trait Acquire: Send + Sync {
    async fn acquire(&self, source_url: &str, recipient: &str) -> Result<(), PipelineError>;
}

#[async_trait]
impl Acquire for Pipeline {
    async fn acquire(&self, source_url: &str, recipient: &str) -> Result<(), PipelineError> {
        self.run(source_url, recipient, &ProgressReporter::disabled()).await
    }
}

/// Shared handler state.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) acquirer: Arc<dyn Acquire>,
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadQuery {
    #[serde(alias = "source_url")]
    goodreads_url: String,
    #[serde(alias = "recipient")]
    kindle_mail: String,
    #[serde(default)]
    key: String,
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

fn validate(query: &DownloadQuery) -> Result<(), String> {
    let url = url::Url::parse(&query.goodreads_url).map_err(|e| format!("goodreads_url: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("goodreads_url: expected an http(s) URL".to_string());
    }
    query
        .kindle_mail
        .parse::<lettre::Address>()
        .map_err(|e| format!("kindle_mail: {e}"))?;
    Ok(())
}

async fn handle_download(State(state): State<ServerState>, Query(query): Query<DownloadQuery>) -> Response {
    if let Some(expected) = &state.api_key
        && query.key != *expected
    {
        warn!("rejected request with invalid API key");
        return detail(StatusCode::UNAUTHORIZED, "Invalid API key");
    }
    if let Err(reason) = validate(&query) {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, reason);
    }

    info!(
        source = %query.goodreads_url,
        recipient = %redact_address(&query.kindle_mail),
        "download requested"
    );
    match state.acquirer.acquire(&query.goodreads_url, &query.kindle_mail).await {
        Ok(()) => (StatusCode::OK, Json(json!(SUCCESS_MESSAGE))).into_response(),
        Err(err) => {
            let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match status.as_u16() {
                404 => warn!(kind = err.kind(), error = %err, "request failed"),
                _ => error!(kind = err.kind(), error = %err, "request failed"),
            }
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                detail(status, "Unexpected error processing request")
            } else {
                detail(status, err.to_string())
            }
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Builds the router.
pub(crate) fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(handle_download))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves until Ctrl-C.
pub(crate) async fn serve(host: &str, port: u16, state: ServerState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "could not install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
        .context("HTTP server failed")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bookrelay_core::{DownloadError, ResolveError};
    use std::net::SocketAddr;
    use std::sync::Mutex;

    enum Outcome {
        Ok,
        NotFound,
        Download,
        Index,
    }

    struct FakeAcquirer {
        outcome: Outcome,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Acquire for FakeAcquirer {
        async fn acquire(&self, source_url: &str, recipient: &str) -> Result<(), PipelineError> {
            self.calls
                .lock()
                .unwrap()
                .push((source_url.to_string(), recipient.to_string()));
            match self.outcome {
                Outcome::Ok => Ok(()),
                Outcome::NotFound => Err(ResolveError::book_not_found("9780134190440", "none").into()),
                Outcome::Download => Err(DownloadError::NoRetrievalPath {
                    reason: "no key".into(),
                }
                .into()),
                Outcome::Index => Err(ResolveError::index_unavailable("https://index.test", "HTTP 500").into()),
            }
        }
    }

    async fn start(outcome: Outcome, api_key: Option<&str>) -> Option<(SocketAddr, Arc<FakeAcquirer>)> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
        let addr = listener.local_addr().unwrap();
        let acquirer = Arc::new(FakeAcquirer {
            outcome,
            calls: Mutex::new(Vec::new()),
        });
        let state = ServerState {
            acquirer: acquirer.clone(),
            api_key: api_key.map(ToString::to_string),
        };
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        Some((addr, acquirer))
    }

    async fn get(addr: SocketAddr, query: &str) -> (u16, serde_json::Value) {
        let response = reqwest::get(format!("http://{addr}/?{query}")).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(serde_json::Value::Null))
    }

    const QUERY: &str = "goodreads_url=https%3A%2F%2Fwww.goodreads.com%2Fbook%2Fshow%2F1&kindle_mail=reader%40kindle.com";

    #[tokio::test]
    async fn test_success_returns_200() {
        let Some((addr, acquirer)) = start(Outcome::Ok, None).await else {
            return;
        };
        let (status, body) = get(addr, QUERY).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!(SUCCESS_MESSAGE));
        let calls = acquirer.calls.lock().unwrap();
        assert_eq!(calls[0].0, "https://www.goodreads.com/book/show/1");
        assert_eq!(calls[0].1, "reader@kindle.com");
    }

    #[tokio::test]
    async fn test_wrong_key_is_401_and_pipeline_not_run() {
        let Some((addr, acquirer)) = start(Outcome::Ok, Some("s3cret")).await else {
            return;
        };
        let (status, body) = get(addr, &format!("{QUERY}&key=wrong")).await;
        assert_eq!(status, 401);
        assert_eq!(body["detail"], "Invalid API key");
        assert!(acquirer.calls.lock().unwrap().is_empty());

        let (status, _) = get(addr, &format!("{QUERY}&key=s3cret")).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_error_classes_map_to_statuses() {
        for (outcome, expected) in [(Outcome::NotFound, 404), (Outcome::Download, 503), (Outcome::Index, 500)] {
            let Some((addr, _)) = start(outcome, None).await else {
                return;
            };
            let (status, body) = get(addr, QUERY).await;
            assert_eq!(status, expected);
            if expected == 500 {
                assert_eq!(body["detail"], "Unexpected error processing request");
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_422() {
        let Some((addr, acquirer)) = start(Outcome::Ok, None).await else {
            return;
        };
        let (status, _) = get(
            addr,
            "goodreads_url=https%3A%2F%2Fwww.goodreads.com%2Fbook%2Fshow%2F1&kindle_mail=nobody",
        )
        .await;
        assert_eq!(status, 422);
        assert!(acquirer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_parameters_rejected() {
        let Some((addr, _)) = start(Outcome::Ok, None).await else {
            return;
        };
        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }
}

//! Caller-facing error taxonomy of a pipeline run.

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::download::DownloadError;
use crate::resolver::ResolveError;

/// One classified failure per run. No partial results are returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source URL is malformed or unreachable.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// The source page carries no identifier.
    #[error("identifier not found: {0}")]
    IdentifierNotFound(String),

    /// No catalog entry matches the identifier.
    #[error("book not found: {0}")]
    BookNotFound(String),

    /// Both retrieval paths failed or none was available.
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// The mail transport rejected the message.
    #[error("email delivery failed: {0}")]
    EmailDelivery(#[from] DeliveryError),

    /// Anything else, such as an unreachable metadata index.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// HTTP status the service surface reports for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSource(_) | Self::IdentifierNotFound(_) | Self::BookNotFound(_) => 404,
            Self::Download(_) => 503,
            Self::EmailDelivery(_) => 502,
            Self::Unexpected(_) => 500,
        }
    }

    /// Short machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSource(_) => "invalid_source",
            Self::IdentifierNotFound(_) => "identifier_not_found",
            Self::BookNotFound(_) => "book_not_found",
            Self::Download(_) => "download_error",
            Self::EmailDelivery(_) => "email_delivery_error",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

impl From<ResolveError> for PipelineError {
    fn from(error: ResolveError) -> Self {
        let message = error.to_string();
        match error {
            ResolveError::InvalidSource { .. } => Self::InvalidSource(message),
            ResolveError::IdentifierNotFound { .. } => Self::IdentifierNotFound(message),
            ResolveError::BookNotFound { .. } => Self::BookNotFound(message),
            ResolveError::IndexUnavailable { .. } | ResolveError::Client { .. } => {
                Self::Unexpected(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (PipelineError::from(ResolveError::invalid_source("u", "r")), 404),
            (PipelineError::from(ResolveError::identifier_not_found("u")), 404),
            (PipelineError::from(ResolveError::book_not_found("123", "r")), 404),
            (PipelineError::from(ResolveError::index_unavailable("u", "r")), 500),
            (
                PipelineError::from(DownloadError::NoRetrievalPath {
                    reason: "r".into(),
                }),
                503,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_kind_labels() {
        let error = PipelineError::from(ResolveError::book_not_found("123", "none"));
        assert_eq!(error.kind(), "book_not_found");
        assert!(error.to_string().starts_with("book not found"));
    }
}

//! Delivery handoff: mails the retrieved artifact to the reader's device.
//!
//! The handoff owns the artifact from the moment it is called. A file on
//! disk is removed after the transport accepts the message; on failure it
//! is left in place for the caller to dispose of.

mod smtp;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use smtp::SmtpMailTransport;

/// The file produced by one retrieval path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievedArtifact {
    /// Downloaded by the browser into the download directory.
    OnDisk(PathBuf),
    /// Fetched into memory by the paid API fallback.
    InMemory {
        /// Attachment filename.
        filename: String,
        /// File contents.
        bytes: Vec<u8>,
    },
}

impl RetrievedArtifact {
    /// Path of an on-disk artifact.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::OnDisk(path) => Some(path),
            Self::InMemory { .. } => None,
        }
    }

    async fn into_attachment(self) -> Result<MailAttachment, DeliveryError> {
        match self {
            Self::OnDisk(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| DeliveryError::Read {
                        path: path.clone(),
                        source,
                    })?;
                let filename = path
                    .file_name()
                    .map_or_else(|| "book.epub".to_string(), |n| n.to_string_lossy().into_owned());
                Ok(MailAttachment { filename, bytes })
            }
            Self::InMemory { filename, bytes } => Ok(MailAttachment { filename, bytes }),
        }
    }
}

/// File attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    /// Attachment filename.
    pub filename: String,
    /// Attachment contents.
    pub bytes: Vec<u8>,
}

/// A single message with one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// The book.
    pub attachment: MailAttachment,
}

/// Mail transport failures.
#[derive(Debug, Error)]
pub enum MailError {
    /// An address could not be parsed.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// Offending address, redacted.
        address: String,
        /// Parser message.
        reason: String,
    },

    /// The message could not be built.
    #[error("could not build message: {reason}")]
    Build {
        /// Builder message.
        reason: String,
    },

    /// The relay refused or dropped the message.
    #[error("mail transport failed: {reason}")]
    Transport {
        /// Transport message.
        reason: String,
    },
}

/// Sends mail. Implemented over SMTP in production.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Sends one message.
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Delivery failures.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The on-disk artifact could not be read.
    #[error("could not read {path}: {source}")]
    Read {
        /// Artifact path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The transport rejected the message.
    #[error("delivery to {recipient} failed: {source}")]
    Mail {
        /// Recipient, redacted.
        recipient: String,
        /// Transport error.
        #[source]
        source: MailError,
    },
}

/// Shortens an address to its first three characters for logs and errors.
#[must_use]
pub fn redact_address(address: &str) -> String {
    let prefix: String = address.chars().take(3).collect();
    format!("{prefix}***")
}

/// Sends artifacts as mail attachments.
#[derive(Clone)]
pub struct DeliveryHandoff {
    transport: Arc<dyn MailTransport>,
    sender: String,
    subject: String,
}

impl DeliveryHandoff {
    /// Creates a handoff sending from `sender` with a fixed `subject`.
    #[must_use]
    pub fn new(transport: Arc<dyn MailTransport>, sender: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            transport,
            sender: sender.into(),
            subject: subject.into(),
        }
    }

    /// Mails `artifact` to `recipient`, removing an on-disk artifact once sent.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Read`] when an on-disk artifact cannot be read.
    /// - [`DeliveryError::Mail`] when the transport fails.
    #[instrument(skip_all, fields(recipient = %redact_address(recipient)))]
    pub async fn deliver(&self, artifact: RetrievedArtifact, recipient: &str) -> Result<(), DeliveryError> {
        let on_disk = artifact.path().map(Path::to_path_buf);
        let attachment = artifact.into_attachment().await?;
        let size_kb = attachment.bytes.len() / 1024;
        let filename = attachment.filename.clone();

        let mail = OutgoingMail {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: self.subject.clone(),
            attachment,
        };
        self.transport
            .send(mail)
            .await
            .map_err(|source| DeliveryError::Mail {
                recipient: redact_address(recipient),
                source,
            })?;
        info!(filename, size_kb, "book delivered");

        if let Some(path) = on_disk
            && let Err(error) = tokio::fs::remove_file(&path).await
        {
            warn!(path = %path.display(), %error, "could not remove delivered file");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for Recording {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Transport {
                    reason: "relay refused".into(),
                });
            }
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    #[test]
    fn test_redact_address_keeps_three_chars() {
        assert_eq!(redact_address("reader@kindle.com"), "rea***");
        assert_eq!(redact_address("ab"), "ab***");
    }

    #[tokio::test]
    async fn test_deliver_in_memory_artifact() {
        let transport = Arc::new(Recording::default());
        let handoff = DeliveryHandoff::new(transport.clone(), "me@example.com", "book");
        let artifact = RetrievedArtifact::InMemory {
            filename: "b.epub".into(),
            bytes: vec![1, 2, 3],
        };
        handoff.deliver(artifact, "reader@kindle.com").await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "reader@kindle.com");
        assert_eq!(sent[0].subject, "book");
        assert_eq!(sent[0].attachment.filename, "b.epub");
    }

    #[tokio::test]
    async fn test_deliver_removes_file_only_after_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"epub").unwrap();

        let failing = DeliveryHandoff::new(
            Arc::new(Recording {
                fail: true,
                ..Recording::default()
            }),
            "me@example.com",
            "book",
        );
        let err = failing
            .deliver(RetrievedArtifact::OnDisk(path.clone()), "reader@kindle.com")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Mail { .. }));
        assert!(!err.to_string().contains("reader@kindle.com"));
        assert!(path.exists(), "file must survive a failed delivery");

        let working = DeliveryHandoff::new(Arc::new(Recording::default()), "me@example.com", "book");
        working
            .deliver(RetrievedArtifact::OnDisk(path.clone()), "reader@kindle.com")
            .await
            .unwrap();
        assert!(!path.exists(), "file must be removed after delivery");
    }

    #[tokio::test]
    async fn test_deliver_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let handoff = DeliveryHandoff::new(Arc::new(Recording::default()), "me@example.com", "book");
        let err = handoff
            .deliver(RetrievedArtifact::OnDisk(dir.path().join("gone.epub")), "x@y.z")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Read { .. }));
    }
}

//! SMTP mail transport (implicit TLS on port 465).

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{MailError, MailTransport, OutgoingMail, redact_address};

/// Authenticated SMTP relay.
pub struct SmtpMailTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// Creates a transport for `host`, logging in as `username`.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Transport`] when the relay cannot be configured.
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, MailError> {
        let inner = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| MailError::Transport {
                reason: e.to_string(),
            })?
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();
        Ok(Self { inner })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: redact_address(address),
        reason: e.to_string(),
    })
}

/// Builds the MIME message: an empty text part and the attachment.
pub(crate) fn build_message(mail: OutgoingMail) -> Result<Message, MailError> {
    let content_type = ContentType::parse("application/octet-stream").map_err(|e| MailError::Build {
        reason: e.to_string(),
    })?;
    let attachment = Attachment::new(mail.attachment.filename).body(mail.attachment.bytes, content_type);

    Message::builder()
        .from(mailbox(&mail.from)?)
        .to(mailbox(&mail.to)?)
        .subject(mail.subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(String::new()))
                .singlepart(attachment),
        )
        .map_err(|e| MailError::Build {
            reason: e.to_string(),
        })
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = build_message(mail)?;
        let response = self.inner.send(message).await.map_err(|e| MailError::Transport {
            reason: e.to_string(),
        })?;
        debug!(code = %response.code(), "relay accepted message");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::delivery::MailAttachment;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            from: "sender@example.com".into(),
            to: to.into(),
            subject: "book".into(),
            attachment: MailAttachment {
                filename: "effective-java.epub".into(),
                bytes: b"PK\x03\x04".to_vec(),
            },
        }
    }

    #[test]
    fn test_build_message_has_subject_and_attachment() {
        let message = build_message(mail("reader@kindle.com")).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("Subject: book"), "{raw}");
        assert!(raw.contains("effective-java.epub"), "{raw}");
        assert!(raw.contains("application/octet-stream"), "{raw}");
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let err = build_message(mail("not an address")).unwrap_err();
        match err {
            MailError::InvalidAddress { address, .. } => assert_eq!(address, "not***"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_accepts_relay_host() {
        assert!(SmtpMailTransport::new("smtp.gmail.com", "me@example.com", "pw").is_ok());
    }
}

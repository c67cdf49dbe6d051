//! Bitwarden CLI secret provider.
//!
//! Runs `bw login --apikey` (credentials from `BW_CLIENTID` / `BW_CLIENTSECRET`),
//! unlocks with the master password from `BW_MASTER_PASSWORD`, reads each
//! configured item's login password and locks the vault again. The session
//! key travels through the child environment, never the argument list.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{SecretProvider, Secrets, SecretsError};
use crate::resolver::utils::compile_static_regex;

static SESSION_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r#"BW_SESSION="([^"]+)""#));

/// Vault item titles for each secret. An empty title skips that secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitwardenItems {
    /// Item holding the mail account password.
    pub mail_password: String,
    /// Item holding the paid API key.
    pub paid_api_key: String,
    /// Item holding the service API key.
    pub api_key: String,
}

impl Default for BitwardenItems {
    fn default() -> Self {
        Self {
            mail_password: "bookrelay mail".to_string(),
            paid_api_key: "annas-archive.org".to_string(),
            api_key: "bookrelay api key".to_string(),
        }
    }
}

/// Extracts the session key from `bw unlock` output.
#[must_use]
pub fn parse_session_key(stdout: &str) -> Option<String> {
    SESSION_RE
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extracts `login.password` from `bw get item` JSON output.
///
/// # Errors
///
/// Returns [`SecretsError::InvalidItem`] for invalid JSON or a missing password.
pub fn parse_item_password(title: &str, stdout: &str) -> Result<String, SecretsError> {
    let invalid = |reason: &str| SecretsError::InvalidItem {
        title: title.to_string(),
        reason: reason.to_string(),
    };
    let item: Value = serde_json::from_str(stdout).map_err(|e| invalid(&format!("invalid JSON: {e}")))?;
    item.pointer("/login/password")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| invalid("no login.password field"))
}

/// Loads secrets from a Bitwarden vault through the `bw` CLI.
#[derive(Debug, Clone)]
pub struct BitwardenSecretProvider {
    program: PathBuf,
    items: BitwardenItems,
}

impl BitwardenSecretProvider {
    /// Creates a provider using `bw` from `PATH`.
    #[must_use]
    pub fn new(items: BitwardenItems) -> Self {
        Self::with_program("bw", items)
    }

    /// Creates a provider running a specific CLI binary.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>, items: BitwardenItems) -> Self {
        Self {
            program: program.into(),
            items,
        }
    }

    async fn run(&self, args: &[&str], session: Option<&str>) -> Result<String, SecretsError> {
        let command_line = format!("bw {}", args.iter().take(2).copied().collect::<Vec<_>>().join(" "));
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(session) = session {
            command.env("BW_SESSION", session);
        }

        let output = command.output().await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SecretsError::CliMissing {
                    program: self.program.display().to_string(),
                }
            } else {
                SecretsError::Io {
                    command: command_line.clone(),
                    source,
                }
            }
        })?;

        if output.status.success() {
            debug!(command = %command_line, "bw command succeeded");
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(SecretsError::CommandFailed {
                command: command_line,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn login(&self) -> Result<(), SecretsError> {
        match self.run(&["login", "--apikey"], None).await {
            Err(SecretsError::CommandFailed { stderr, .. }) if stderr.contains("already logged in") => {
                debug!("bw session already logged in");
                Ok(())
            }
            other => other.map(drop),
        }
    }

    async fn unlock(&self) -> Result<String, SecretsError> {
        let stdout = self
            .run(&["unlock", "--passwordenv", "BW_MASTER_PASSWORD"], None)
            .await?;
        parse_session_key(&stdout).ok_or(SecretsError::SessionKeyMissing)
    }

    async fn item_password(&self, session: &str, title: &str) -> Result<Option<String>, SecretsError> {
        if title.is_empty() {
            return Ok(None);
        }
        let stdout = self.run(&["get", "item", title], Some(session)).await?;
        let password = parse_item_password(title, &stdout)?;
        info!(item = title, "loaded secret from vault");
        Ok(Some(password))
    }

    async fn read_items(&self, session: &str) -> Result<Secrets, SecretsError> {
        Ok(Secrets {
            mail_password: self.item_password(session, &self.items.mail_password).await?,
            paid_api_key: self.item_password(session, &self.items.paid_api_key).await?,
            api_key: self.item_password(session, &self.items.api_key).await?,
        })
    }
}

#[async_trait]
impl SecretProvider for BitwardenSecretProvider {
    async fn load(&self) -> Result<Secrets, SecretsError> {
        info!("fetching secrets from Bitwarden vault");
        self.login().await?;
        let session = self.unlock().await?;

        let secrets = self.read_items(&session).await;
        match self.run(&["lock"], None).await {
            Ok(_) => info!("Bitwarden vault locked"),
            Err(error) => warn!(%error, "Bitwarden vault lock failed"),
        }
        secrets
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_key_from_unlock_output() {
        let stdout = "Your vault is now unlocked!\n\n$ export BW_SESSION=\"abc+def/123==\"\n";
        assert_eq!(parse_session_key(stdout).as_deref(), Some("abc+def/123=="));
    }

    #[test]
    fn test_parse_session_key_missing() {
        assert!(parse_session_key("Invalid master password.").is_none());
    }

    #[test]
    fn test_parse_item_password() {
        let stdout = r#"{"name":"mail","login":{"username":"me","password":"s3cret"}}"#;
        assert_eq!(parse_item_password("mail", stdout).unwrap(), "s3cret");
    }

    #[test]
    fn test_parse_item_password_without_login() {
        let err = parse_item_password("note", r#"{"name":"note","notes":"x"}"#).unwrap_err();
        assert!(matches!(err, SecretsError::InvalidItem { .. }));
        let err = parse_item_password("bad", "not json").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_missing_cli_is_reported() {
        let provider = BitwardenSecretProvider::with_program(
            "/nonexistent/bookrelay-test-bw",
            BitwardenItems::default(),
        );
        let err = provider.load().await.unwrap_err();
        assert!(matches!(err, SecretsError::CliMissing { .. }), "got {err:?}");
    }
}

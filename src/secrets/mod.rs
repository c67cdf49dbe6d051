//! Credential providers.
//!
//! Secrets are loaded once before the pipeline is built. The mail password
//! is mandatory; a missing paid API key only disables the fallback path and
//! a missing service key leaves the HTTP surface open.

mod bitwarden;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use bitwarden::{BitwardenItems, BitwardenSecretProvider, parse_item_password, parse_session_key};

/// Env var holding the mail account password.
pub const MAIL_PASSWORD_VAR: &str = "BOOKRELAY_MAIL_PASSWORD";
/// Env var holding the paid API key.
pub const PAID_API_KEY_VAR: &str = "BOOKRELAY_PAID_API_KEY";
/// Env var holding the key callers of the HTTP surface must present.
pub const API_KEY_VAR: &str = "BOOKRELAY_API_KEY";

/// Errors raised while loading secrets. Fatal at startup.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The secret manager CLI is not installed.
    #[error("secret manager CLI '{program}' not found in PATH")]
    CliMissing {
        /// Program name or path.
        program: String,
    },

    /// A secret manager command exited with failure.
    #[error("'{command}' failed: {stderr}")]
    CommandFailed {
        /// Command line without secrets.
        command: String,
        /// Trimmed stderr.
        stderr: String,
    },

    /// The unlock output carried no session key.
    #[error("could not read a session key from the unlock output")]
    SessionKeyMissing,

    /// A vault item had no usable password.
    #[error("vault item '{title}' has no login password: {reason}")]
    InvalidItem {
        /// Item title.
        title: String,
        /// What was wrong.
        reason: String,
    },

    /// A required secret is absent.
    #[error("required secret '{name}' is not set")]
    Missing {
        /// Secret name.
        name: &'static str,
    },

    /// Spawning or awaiting a process failed.
    #[error("could not run '{command}': {source}")]
    Io {
        /// Command line.
        command: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Plaintext credentials for one process lifetime.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    /// Mail account password.
    pub mail_password: Option<String>,
    /// Paid API key; absent means no fallback path.
    pub paid_api_key: Option<String>,
    /// Key required from HTTP callers; absent means no check.
    pub api_key: Option<String>,
}

impl Secrets {
    /// Returns the mail password.
    ///
    /// # Errors
    ///
    /// Returns [`SecretsError::Missing`] when it is absent.
    pub fn mail_password(&self) -> Result<&str, SecretsError> {
        self.mail_password
            .as_deref()
            .ok_or(SecretsError::Missing {
                name: "mail password",
            })
    }

    /// Fills fields absent here from `other`.
    #[must_use]
    pub fn or(self, other: Secrets) -> Secrets {
        Secrets {
            mail_password: self.mail_password.or(other.mail_password),
            paid_api_key: self.paid_api_key.or(other.paid_api_key),
            api_key: self.api_key.or(other.api_key),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |value: &Option<String>| if value.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("mail_password", &mask(&self.mail_password))
            .field("paid_api_key", &mask(&self.paid_api_key))
            .field("api_key", &mask(&self.api_key))
            .finish()
    }
}

/// Source of [`Secrets`].
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Loads all secrets this provider knows about.
    async fn load(&self) -> Result<Secrets, SecretsError>;
}

/// Reads secrets from `BOOKRELAY_*` environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    /// Builds secrets from a variable lookup; empty values count as absent.
    pub fn secrets_from(lookup: impl Fn(&str) -> Option<String>) -> Secrets {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Secrets {
            mail_password: read(MAIL_PASSWORD_VAR),
            paid_api_key: read(PAID_API_KEY_VAR),
            api_key: read(API_KEY_VAR),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn load(&self) -> Result<Secrets, SecretsError> {
        Ok(Self::secrets_from(|name| std::env::var(name).ok()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_secrets_from_lookup_skips_empty_values() {
        let vars: HashMap<&str, &str> = [(MAIL_PASSWORD_VAR, "pw"), (PAID_API_KEY_VAR, "  ")]
            .into_iter()
            .collect();
        let secrets = EnvSecretProvider::secrets_from(|name| vars.get(name).map(ToString::to_string));
        assert_eq!(secrets.mail_password.as_deref(), Some("pw"));
        assert!(secrets.paid_api_key.is_none());
        assert!(secrets.api_key.is_none());
    }

    #[test]
    fn test_mail_password_is_required() {
        let err = Secrets::default().mail_password().unwrap_err();
        assert!(matches!(err, SecretsError::Missing { .. }));
    }

    #[test]
    fn test_or_prefers_self() {
        let env = Secrets {
            api_key: Some("env".into()),
            ..Secrets::default()
        };
        let vault = Secrets {
            api_key: Some("vault".into()),
            mail_password: Some("pw".into()),
            ..Secrets::default()
        };
        let merged = env.or(vault);
        assert_eq!(merged.api_key.as_deref(), Some("env"));
        assert_eq!(merged.mail_password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_debug_never_prints_values() {
        let secrets = Secrets {
            mail_password: Some("hunter2".into()),
            ..Secrets::default()
        };
        let printed = format!("{secrets:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<set>"));
    }
}
